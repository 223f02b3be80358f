//! Ownership roots.
//!
//! Every signal and computation belongs to the owner that was active when it
//! was created. Computations own what they create during a run; a [`Root`]
//! is an owner with no owner of its own and no body to re-run. Disposing an
//! owner disposes everything it owns, last created first, then runs its
//! cleanups in reverse registration order.

use super::context::ReactiveContext;
use super::runtime::with_runtime;
use crate::graph::{NodeId, NodeKind};

/// An un-owned boundary that owns a tree of reactive nodes.
///
/// # Example
///
/// ```rust
/// use filament_core::{on_cleanup, Effect, Root, Signal};
///
/// let count = Signal::new(0);
/// let (root, effect) = Root::new(|| {
///     let read = count.clone();
///     on_cleanup(|| println!("root disposed"));
///     Effect::new(move |_| {
///         read.get();
///     })
/// });
///
/// root.dispose();
/// assert!(effect.is_disposed());
/// assert_eq!(count.observer_count(), 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Root {
    id: NodeId,
}

impl Root {
    /// Create a root and run `f` under it.
    pub fn new<R>(f: impl FnOnce() -> R) -> (Self, R) {
        let id = with_runtime(|rt| rt.create_node_owned(NodeKind::Root, None));
        let root = Self { id };
        let result = root.run(f);
        (root, result)
    }

    /// Run `f` with this root as the current owner.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        Owner { id: self.id }.run(f)
    }

    /// Dispose the root and everything it owns.
    ///
    /// Disposing twice is a no-op.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.batch(|| rt.dispose(self.id)));
    }

    pub fn is_disposed(&self) -> bool {
        with_runtime(|rt| rt.is_disposed(self.id))
    }

    /// The root as an [`Owner`].
    pub fn owner(&self) -> Owner {
        Owner { id: self.id }
    }
}

/// The node that owns whatever gets created right now: a root or a running
/// computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Owner {
    id: NodeId,
}

impl Owner {
    /// The current owner, if any.
    pub fn current() -> Option<Self> {
        ReactiveContext::current_owner().map(|id| Self { id })
    }

    /// Run `f` with this owner as the current owner, without tracking
    /// dependencies.
    ///
    /// Anything `f` creates is disposed together with this owner.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> R {
        with_owner(Some(self.id), f)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Register a cleanup with this owner.
    pub fn on_cleanup(&self, cleanup: impl FnOnce() + 'static) {
        with_runtime(|rt| rt.add_cleanup(self.id, Box::new(cleanup)));
    }

    /// Check if this owner has been disposed.
    pub fn is_disposed(&self) -> bool {
        with_runtime(|rt| rt.is_disposed(self.id))
    }
}

/// Run `f` untracked with `owner` as the current owner.
pub(crate) fn with_owner<R>(owner: Option<NodeId>, f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::enter(None, owner);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{on_cleanup, Effect, Signal};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn root_is_the_owner_inside_run() {
        let (root, owner) = Root::new(Owner::current);
        assert_eq!(owner, Some(root.owner()));
        assert!(Owner::current().is_none());
    }

    #[test]
    fn dispose_runs_cleanups_once_in_reverse() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let (root, ()) = Root::new(|| {
            for name in ["first", "second", "third"] {
                let order = order.clone();
                on_cleanup(move || order.borrow_mut().push(name));
            }
        });

        root.dispose();
        root.dispose();
        assert!(root.is_disposed());
        assert_eq!(*order.borrow(), vec!["third", "second", "first"]);
    }

    #[test]
    fn children_are_disposed_before_cleanups() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let (root, ()) = Root::new(|| {
            let log = order.clone();
            on_cleanup(move || log.borrow_mut().push("root"));
            let log = order.clone();
            Effect::new(move |_| {
                let log = log.clone();
                on_cleanup(move || log.borrow_mut().push("effect"));
            });
        });

        root.dispose();
        assert_eq!(*order.borrow(), vec!["effect", "root"]);
    }

    #[test]
    fn rerun_disposes_previous_children() {
        let trigger = Signal::new(0);
        let inner_runs = Rc::new(RefCell::new(0));

        let (root, ()) = Root::new(|| {
            let (t, runs) = (trigger.clone(), inner_runs.clone());
            Effect::new(move |_| {
                t.get();
                let runs = runs.clone();
                // A fresh inner effect per outer run
                Effect::new(move |_| *runs.borrow_mut() += 1);
            });
        });

        trigger.set(1);
        trigger.set(2);
        assert_eq!(*inner_runs.borrow(), 3);

        root.dispose();
        trigger.set(3);
        assert_eq!(*inner_runs.borrow(), 3);
    }
}
