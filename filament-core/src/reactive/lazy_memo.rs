//! Lazy memos.
//!
//! A [`LazyMemo`] does no work while nobody listens. The backing memo is
//! created on the first tracked read and torn down once the last tracked
//! reader is gone. Untracked reads in between recompute only when a source
//! changed since the previous computation.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use tracing::error;

use super::context::ReactiveContext;
use super::memo::Memo;
use super::root::with_owner;
use super::runtime::{on_cleanup, with_runtime, Computation};
use super::signal::Equals;
use crate::graph::{NodeId, NodeKind};

/// A memo whose computation only exists while it is observed.
///
/// # Example
///
/// ```rust
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use filament_core::{LazyMemo, Signal};
///
/// let runs = Rc::new(Cell::new(0));
/// let source = Signal::new(1);
///
/// let (r, s) = (runs.clone(), source.clone());
/// let lazy = LazyMemo::new(move |_| {
///     r.set(r.get() + 1);
///     s.get() * 2
/// });
///
/// source.set(2);
/// source.set(3);
/// assert_eq!(runs.get(), 0);
///
/// assert_eq!(lazy.get(), 6);
/// assert_eq!(runs.get(), 1);
/// ```
pub struct LazyMemo<T: 'static> {
    inner: Rc<LazyInner<T>>,
}

struct LazyInner<T: 'static> {
    compute: Rc<dyn Fn(Option<&T>) -> T>,
    equals: Equals<T>,
    /// Owner at creation; the backing memo and the probe live under it.
    owner: Option<NodeId>,
    listeners: Rc<Cell<usize>>,
    memo: RefCell<Option<Memo<T>>>,
    /// Set when the graph tried to recompute the memo with no listener.
    skipped: Rc<Cell<bool>>,
    /// Change detector for untracked reads while there is no memo.
    probe: Cell<Option<NodeId>>,
    stale: Rc<Cell<bool>>,
    /// Value computed by the latest untracked read.
    value: RefCell<Option<T>>,
    /// Set while the first computation of a memo or an untracked refresh
    /// runs.
    computing: Cell<bool>,
}

/// Clears the computing flag, also when the computation unwinds.
struct Computing<'a>(&'a Cell<bool>);

impl<'a> Computing<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for Computing<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Flags the lazy memo stale when one of its sources changes.
struct Probe {
    stale: Rc<Cell<bool>>,
}

impl Computation for Probe {
    fn run(&self) -> bool {
        self.stale.set(true);
        false
    }
}

impl<T: PartialEq + 'static> LazyMemo<T> {
    /// Create a lazy memo that notifies only when its value changes.
    pub fn new(compute: impl Fn(Option<&T>) -> T + 'static) -> Self {
        Self::with_equality(compute, Equals::default())
    }
}

impl<T: 'static> LazyMemo<T> {
    /// Create a lazy memo with a custom equality.
    pub fn with_equality(compute: impl Fn(Option<&T>) -> T + 'static, equals: Equals<T>) -> Self {
        Self {
            inner: Rc::new(LazyInner {
                compute: Rc::new(compute),
                equals,
                owner: ReactiveContext::current_owner(),
                listeners: Rc::new(Cell::new(0)),
                memo: RefCell::new(None),
                skipped: Rc::new(Cell::new(false)),
                probe: Cell::new(None),
                stale: Rc::new(Cell::new(true)),
                value: RefCell::new(None),
                computing: Cell::new(false),
            }),
        }
    }

    /// Borrow the current value.
    ///
    /// A tracked read makes the caller a listener until its next run or its
    /// disposal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if self.inner.computing.get() {
            error!("lazy memo read itself during its computation");
            panic!("cyclic read: lazy memo read itself during its computation");
        }

        if ReactiveContext::is_tracking() {
            self.listen();
            let memo = self.inner.ensure_memo();
            return memo.with(f);
        }

        let memo = self.inner.memo.borrow().clone();
        if let Some(memo) = memo {
            if self.inner.listeners.get() > 0 {
                return memo.with_untracked(f);
            }
            // A suspended memo may hold a stale value
            self.inner.teardown();
        }

        self.inner.refresh();
        let value = self.inner.value.borrow();
        match value.as_ref() {
            Some(value) => f(value),
            None => unreachable!("refresh always leaves a value"),
        }
    }

    /// Number of tracked reads currently keeping the memo alive.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.get()
    }

    /// Whether the backing memo exists.
    pub fn is_active(&self) -> bool {
        self.inner.memo.borrow().is_some()
    }

    fn listen(&self) {
        let inner = &self.inner;
        inner.listeners.set(inner.listeners.get() + 1);

        let weak = Rc::downgrade(inner);
        let observer = ReactiveContext::current_observer();
        on_cleanup(move || LazyInner::release(&weak, observer));
    }
}

impl<T: Clone + 'static> LazyMemo<T> {
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn get_untracked(&self) -> T {
        super::runtime::untrack(|| self.get())
    }
}

impl<T: 'static> Clone for LazyMemo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> LazyInner<T> {
    fn ensure_memo(&self) -> Memo<T> {
        if let Some(memo) = self.memo.borrow().as_ref() {
            if self.skipped.replace(false) {
                // Catch up before the caller starts observing it
                memo.invalidate();
                memo.with_untracked(|_| ());
            }
            return memo.clone();
        }

        // The memo tracks from here on
        if let Some(probe) = self.probe.take() {
            with_runtime(|rt| rt.dispose(probe));
        }

        let compute = self.compute.clone();
        let (listeners, skipped) = (self.listeners.clone(), self.skipped.clone());
        let _computing = Computing::enter(&self.computing);
        let memo = with_owner(self.owner, || {
            Memo::gated(
                move |prev| compute(prev),
                self.equals.clone(),
                move || {
                    let open = listeners.get() > 0;
                    if !open {
                        skipped.set(true);
                    }
                    open
                },
            )
        });
        *self.memo.borrow_mut() = Some(memo.clone());
        memo
    }

    fn release(weak: &Weak<Self>, observer: Option<NodeId>) {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let remaining = inner.listeners.get().saturating_sub(1);
        inner.listeners.set(remaining);
        if remaining > 0 {
            return;
        }

        let disposing = observer.map_or(true, |id| with_runtime(|rt| rt.is_disposed(id)));
        if disposing {
            inner.teardown();
            return;
        }

        // A re-running observer usually reads again right away. Until then
        // the memo is suspended and teardown waits for the flush to settle.
        let weak = weak.clone();
        with_runtime(|rt| {
            rt.after_flush(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    if inner.listeners.get() == 0 {
                        inner.teardown();
                    }
                }
            }));
        });
    }

    fn teardown(&self) {
        let memo = self.memo.borrow_mut().take();
        if let Some(memo) = memo {
            memo.dispose();
            self.stale.set(true);
            self.skipped.set(false);
        }
    }

    /// Recompute for an untracked read if a source changed since the last
    /// computation.
    fn refresh(&self) {
        if !self.stale.get() && self.value.borrow().is_some() {
            return;
        }

        let probe = match self.probe.get() {
            Some(probe) => probe,
            None => {
                let probe = with_runtime(|rt| {
                    let id = rt.create_node_owned(NodeKind::Computed, self.owner);
                    rt.register_computation(
                        id,
                        Rc::new(Probe {
                            stale: self.stale.clone(),
                        }),
                    );
                    id
                });
                self.probe.set(Some(probe));
                probe
            }
        };

        let prev = self.value.borrow_mut().take();
        let _computing = Computing::enter(&self.computing);
        let next = with_runtime(|rt| rt.track_as(probe, || (self.compute)(prev.as_ref())));
        *self.value.borrow_mut() = Some(next);
        self.stale.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Root, Signal};

    fn counted(source: &Signal<i32>) -> (LazyMemo<i32>, Rc<Cell<usize>>) {
        let runs = Rc::new(Cell::new(0));
        let (r, s) = (runs.clone(), source.clone());
        let lazy = LazyMemo::new(move |_| {
            r.set(r.get() + 1);
            s.get() + 1
        });
        (lazy, runs)
    }

    #[test]
    fn untracked_reads_recompute_only_after_a_change() {
        let source = Signal::new(1);
        let (lazy, runs) = counted(&source);

        assert_eq!(lazy.get(), 2);
        assert_eq!(lazy.get(), 2);
        assert_eq!(runs.get(), 1);

        source.set(5);
        source.set(6);
        assert_eq!(runs.get(), 1);
        assert_eq!(lazy.get(), 7);
        assert_eq!(runs.get(), 2);
        assert!(!lazy.is_active());
    }

    #[test]
    fn listeners_keep_the_memo_alive() {
        let source = Signal::new(1);
        let (lazy, runs) = counted(&source);

        let (root, ()) = Root::new(|| {
            let lazy = lazy.clone();
            Effect::new(move |_| {
                lazy.get();
            });
        });
        assert!(lazy.is_active());
        assert_eq!(lazy.listener_count(), 1);
        assert_eq!(runs.get(), 1);

        source.set(2);
        assert_eq!(runs.get(), 2);
        assert_eq!(lazy.listener_count(), 1);
        assert!(lazy.is_active());

        root.dispose();
        assert_eq!(lazy.listener_count(), 0);
        assert!(!lazy.is_active());

        // Nobody listens any more
        source.set(3);
        assert_eq!(runs.get(), 2);
    }
    #[test]
    fn no_recompute_while_waiting_for_teardown() {
        let source = Signal::new(1);
        let (lazy, runs) = counted(&source);
        let show = Signal::new(true);

        let (l, sh) = (lazy.clone(), show.clone());
        let _reader = Effect::new(move |_| {
            if sh.get() {
                l.get();
            }
        });
        // Writes a source later in the same flush that dropped the reader
        let (sh, src) = (show.clone(), source.clone());
        let _writer = Effect::new(move |_| {
            if !sh.get() {
                src.set(10);
            }
        });
        assert_eq!(runs.get(), 1);

        show.set(false);
        assert_eq!(lazy.listener_count(), 0);
        assert_eq!(runs.get(), 1);
        assert!(!lazy.is_active());

        show.set(true);
        assert_eq!(lazy.get_untracked(), 11);
        assert_eq!(runs.get(), 2);
        assert!(lazy.is_active());
    }

    #[test]
    fn suspended_memo_resumes_with_a_fresh_value() {
        let source = Signal::new(1);
        let (lazy, runs) = counted(&source);
        let show = Signal::new(true);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (l, sh, log) = (lazy.clone(), show.clone(), seen.clone());
        let _reader = Effect::new(move |_| {
            if sh.get() {
                log.borrow_mut().push(l.get());
            }
        });
        // Hides the reader, writes the source, then shows the reader again
        // within one flush
        let (sh, src) = (show.clone(), source.clone());
        let _toggler = Effect::new(move |_| {
            if !sh.get() {
                src.set(10);
                sh.set(true);
            }
        });

        show.set(false);
        assert_eq!(*seen.borrow(), vec![2, 11]);
        assert_eq!(runs.get(), 2);
        assert_eq!(lazy.listener_count(), 1);
        assert!(lazy.is_active());

        source.set(20);
        assert_eq!(*seen.borrow(), vec![2, 11, 21]);
    }

    #[test]
    #[should_panic(expected = "cyclic read")]
    fn reading_itself_is_a_cycle() {
        let slot: Rc<RefCell<Option<LazyMemo<i32>>>> = Rc::default();
        let inner = slot.clone();
        let lazy = LazyMemo::new(move |_| inner.borrow().as_ref().map_or(0, |l| l.get() + 1));
        *slot.borrow_mut() = Some(lazy.clone());
        lazy.get();
    }
}
