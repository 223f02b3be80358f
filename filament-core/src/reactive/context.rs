//! Reactive Context
//!
//! The reactive context tracks which computation is currently running and
//! which node owns whatever gets created right now. This enables automatic
//! dependency tracking: when a signal is read, we can register the current
//! computation as a dependent.
//!
//! # Implementation
//!
//! We use a thread-local stack of frames. Running a computation pushes a
//! frame whose observer and owner are that computation; `untrack` pushes a
//! frame that keeps the owner but has no observer; running code under a root
//! pushes a frame owned by the root. When the guard is dropped the frame is
//! popped again.
//!
//! This design supports nested reactive contexts (e.g., a memo that reads
//! from another memo).

use std::cell::RefCell;

use indexmap::IndexSet;

use crate::graph::NodeId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

/// An entry in the reactive context stack.
#[derive(Debug, Clone)]
struct ContextEntry {
    /// The computation collecting dependencies, if any.
    observer: Option<NodeId>,
    /// The node that owns nodes created inside this frame.
    owner: Option<NodeId>,
    /// Sources read while this frame was on top, in read order.
    sources: IndexSet<NodeId>,
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
#[derive(Debug)]
pub struct ReactiveContext {
    observer: Option<NodeId>,
    popped: bool,
}

impl ReactiveContext {
    /// Enter a new context.
    ///
    /// While this context is active, any source that is read registers
    /// `observer` (if there is one) as a dependent, and any node that is
    /// created is owned by `owner`.
    pub fn enter(observer: Option<NodeId>, owner: Option<NodeId>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                observer,
                owner,
                sources: IndexSet::new(),
            });
        });

        Self {
            observer,
            popped: false,
        }
    }

    /// Enter a frame that stops dependency tracking but keeps the owner.
    pub fn untracked() -> Self {
        Self::enter(None, Self::current_owner())
    }

    /// Check if a computation is currently collecting dependencies.
    pub fn is_tracking() -> bool {
        Self::current_observer().is_some()
    }

    /// Get the computation collecting dependencies, if any.
    pub fn current_observer() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.observer))
    }

    /// Get the current owner, if any.
    pub fn current_owner() -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().and_then(|entry| entry.owner))
    }

    /// Record a read of `source` in the innermost frame.
    ///
    /// Returns the observer that now depends on `source`, if any.
    pub fn track(source: NodeId) -> Option<NodeId> {
        CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let observer = entry.observer?;
            if observer == source {
                return None;
            }
            entry.sources.insert(source);
            Some(observer)
        })
    }

    /// Pop the frame and return the sources read while it was active.
    pub fn finish(mut self) -> IndexSet<NodeId> {
        self.popped = true;
        Self::pop(self.observer).unwrap_or_default()
    }

    fn pop(expected: Option<NodeId>) -> Option<IndexSet<NodeId>> {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right context.
            // This helps catch bugs where contexts are mismatched.
            popped.map(|entry| {
                debug_assert_eq!(
                    entry.observer, expected,
                    "ReactiveContext mismatch: expected {:?}, got {:?}",
                    expected, entry.observer
                );
                entry.sources
            })
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        if !self.popped {
            Self::pop(self.observer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tracks_observer() {
        let id = NodeId::new();

        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current_observer().is_none());

        {
            let _ctx = ReactiveContext::enter(Some(id), Some(id));

            assert!(ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current_observer(), Some(id));
            assert_eq!(ReactiveContext::current_owner(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_tracking());
        assert!(ReactiveContext::current_owner().is_none());
    }

    #[test]
    fn context_collects_sources_once_each() {
        let id = NodeId::new();
        let ctx = ReactiveContext::enter(Some(id), Some(id));

        let (a, b) = (NodeId::new(), NodeId::new());
        assert_eq!(ReactiveContext::track(a), Some(id));
        assert_eq!(ReactiveContext::track(b), Some(id));
        assert_eq!(ReactiveContext::track(a), Some(id));

        let sources: Vec<_> = ctx.finish().into_iter().collect();
        assert_eq!(sources, vec![a, b]);
    }

    #[test]
    fn untracked_frame_keeps_owner() {
        let id = NodeId::new();
        let _ctx = ReactiveContext::enter(Some(id), Some(id));

        {
            let _untracked = ReactiveContext::untracked();
            assert!(!ReactiveContext::is_tracking());
            assert_eq!(ReactiveContext::current_owner(), Some(id));
            assert_eq!(ReactiveContext::track(NodeId::new()), None);
        }

        assert_eq!(ReactiveContext::current_observer(), Some(id));
    }

    #[test]
    fn nested_contexts() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();

        {
            let _ctx1 = ReactiveContext::enter(Some(id1), Some(id1));
            assert_eq!(ReactiveContext::current_observer(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(Some(id2), Some(id2));
                assert_eq!(ReactiveContext::current_observer(), Some(id2));
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_observer(), Some(id1));
        }

        assert!(ReactiveContext::current_observer().is_none());
    }
}
