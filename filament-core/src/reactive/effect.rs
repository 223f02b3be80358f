//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies (or at the end of the current batch when
//!    deferred).
//!
//! 2. When any dependency changes, the effect is queued and re-runs in the
//!    next flush, after every memo has settled.
//!
//! 3. Before re-running, everything the effect created during its previous
//!    run is disposed and its cleanups run. Dependencies read during the new
//!    run replace the old ones.
//!
//! # Differences from Memo
//!
//! - Memos cache a value and notify only when it changes; an effect's return
//!   value is only handed back to its next run.
//! - Effects run after every memo of the same flush.
//!
//! # Computed
//!
//! [`Computed`] is an effect that is scheduled with memos, before effects.
//! It is meant for synchronous derived side effects, like driving a
//! transition state machine, that effects of the same flush must observe.
//!
//! # Cleanup
//!
//! Use [`on_cleanup`](super::on_cleanup) inside the effect to register a
//! function that runs before the next run and when the effect is disposed.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::runtime::{with_runtime, Computation};
use crate::graph::{NodeId, NodeKind};

/// Options for [`Effect::with_options`] and [`Computed::with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EffectOptions {
    /// Run for the first time at the end of the current batch or flush
    /// instead of right away.
    pub defer: bool,
}

struct EffectInner<T> {
    run: RefCell<Box<dyn FnMut(Option<T>) -> T>>,
    prev: RefCell<Option<T>>,
    run_count: Rc<Cell<usize>>,
}

impl<T: 'static> Computation for EffectInner<T> {
    fn run(&self) -> bool {
        let prev = self.prev.borrow_mut().take();
        let next = (self.run.borrow_mut())(prev);
        *self.prev.borrow_mut() = Some(next);
        self.run_count.set(self.run_count.get() + 1);
        false
    }
}

/// Handle state shared by [`Effect`] and [`Computed`].
#[derive(Clone)]
struct Handle {
    id: NodeId,
    run_count: Rc<Cell<usize>>,
}

impl Handle {
    fn create<T: 'static>(
        kind: NodeKind,
        run: impl FnMut(Option<T>) -> T + 'static,
        options: EffectOptions,
    ) -> Self {
        let run_count = Rc::new(Cell::new(0));
        let inner = Rc::new(EffectInner {
            run: RefCell::new(Box::new(run)),
            prev: RefCell::new(None),
            run_count: run_count.clone(),
        });

        let id = with_runtime(|rt| {
            let id = rt.create_node(kind);
            rt.register_computation(id, inner.clone());
            id
        });

        let handle = Self { id, run_count };

        with_runtime(|rt| {
            if options.defer {
                rt.schedule(id);
            } else {
                rt.batch(|| rt.update_if_needed(id));
            }
        });

        handle
    }

    fn dispose(&self) {
        with_runtime(|rt| rt.batch(|| rt.dispose(self.id)));
    }

    fn is_disposed(&self) -> bool {
        with_runtime(|rt| rt.is_disposed(self.id))
    }

    fn dependency_count(&self) -> usize {
        with_runtime(|rt| rt.source_count(self.id))
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// The function receives whatever it returned on its previous run (`None`
/// on the first run).
///
/// # Example
///
/// ```rust
/// use filament_core::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let seen = Signal::new(Vec::new());
///
/// let (c, s) = (count.clone(), seen.clone());
/// let _effect = Effect::new(move |_| {
///     let n = c.get();
///     s.update_untracked(|v| v.push(n));
/// });
///
/// count.set(5);
/// assert_eq!(seen.get(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    handle: Handle,
}

impl Effect {
    /// Create a new effect and run it immediately.
    pub fn new<T: 'static>(run: impl FnMut(Option<T>) -> T + 'static) -> Self {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new effect with options.
    pub fn with_options<T: 'static>(
        run: impl FnMut(Option<T>) -> T + 'static,
        options: EffectOptions,
    ) -> Self {
        Self {
            handle: Handle::create(NodeKind::Effect, run, options),
        }
    }

    /// Get the effect's node ID.
    pub fn id(&self) -> NodeId {
        self.handle.id
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again. Its cleanups and
    /// everything it owns are disposed right away.
    pub fn dispose(&self) {
        self.handle.dispose();
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.handle.run_count.get()
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.handle.dependency_count()
    }
}

/// An effect that runs in the pure phase of a flush, before effects.
#[derive(Clone)]
pub struct Computed {
    handle: Handle,
}

impl Computed {
    /// Create a new computed reaction and run it immediately.
    pub fn new<T: 'static>(run: impl FnMut(Option<T>) -> T + 'static) -> Self {
        Self::with_options(run, EffectOptions::default())
    }

    /// Create a new computed reaction with options.
    pub fn with_options<T: 'static>(
        run: impl FnMut(Option<T>) -> T + 'static,
        options: EffectOptions,
    ) -> Self {
        Self {
            handle: Handle::create(NodeKind::Computed, run, options),
        }
    }

    pub fn id(&self) -> NodeId {
        self.handle.id
    }

    pub fn dispose(&self) {
        self.handle.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.handle.is_disposed()
    }

    pub fn run_count(&self) -> usize {
        self.handle.run_count.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{batch, Memo, Signal};

    #[test]
    fn effect_runs_immediately() {
        let effect = Effect::new(|_| {});
        assert_eq!(effect.run_count(), 1);
        assert_eq!(effect.dependency_count(), 0);
    }

    #[test]
    fn effect_reruns_on_change() {
        let count = Signal::new(0);
        let read = count.clone();
        let effect = Effect::new(move |_| {
            read.get();
        });

        count.set(1);
        count.set(1);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_receives_previous_return() {
        let source = Signal::new(1);
        let read = source.clone();
        let history = Rc::new(RefCell::new(Vec::new()));
        let log = history.clone();

        let _effect = Effect::new(move |prev: Option<i32>| {
            let next = read.get();
            log.borrow_mut().push((prev, next));
            next
        });
        source.set(2);

        assert_eq!(*history.borrow(), vec![(None, 1), (Some(1), 2)]);
    }

    #[test]
    fn deferred_effect_waits_for_batch() {
        let effect = batch(|| {
            let effect = Effect::with_options(|_| {}, EffectOptions { defer: true });
            assert_eq!(effect.run_count(), 0);
            effect
        });
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn disposed_effect_stops() {
        let count = Signal::new(0);
        let read = count.clone();
        let effect = Effect::new(move |_| {
            read.get();
        });

        effect.dispose();
        count.set(1);
        assert!(effect.is_disposed());
        assert_eq!(effect.run_count(), 1);
        assert_eq!(count.observer_count(), 0);
    }

    #[test]
    fn computed_runs_before_effects() {
        let source = Signal::new(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        let (s, log) = (source.clone(), order.clone());
        let _effect = Effect::new(move |_| {
            s.get();
            log.borrow_mut().push("effect");
        });
        let (s, log) = (source.clone(), order.clone());
        let _computed = Computed::new(move |_| {
            s.get();
            log.borrow_mut().push("computed");
        });

        order.borrow_mut().clear();
        source.set(1);
        assert_eq!(*order.borrow(), vec!["computed", "effect"]);
    }

    #[test]
    fn effect_sees_settled_memos() {
        let a = Signal::new(1);
        let read = a.clone();
        let double = Memo::new(move |_| read.get() * 2);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (a2, d, log) = (a.clone(), double.clone(), seen.clone());
        let _effect = Effect::new(move |_| {
            log.borrow_mut().push((a2.get(), d.get()));
        });

        a.set(5);
        assert_eq!(*seen.borrow(), vec![(1, 2), (5, 10)]);
    }
}
