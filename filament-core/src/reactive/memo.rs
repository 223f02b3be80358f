//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Memos Work
//!
//! 1. On creation, the memo runs its computation and caches the result.
//!
//! 2. When a source changes, the memo is marked dirty; memos downstream of
//!    it are marked "maybe dirty".
//!
//! 3. The memo recomputes in the next flush, or earlier if something reads
//!    it first.
//!
//! 4. A "maybe dirty" memo first brings its memo sources up to date. If none
//!    of them produced a new value, it is marked clean without recomputing.
//!
//! 5. Observers are notified only when the recomputed value differs from the
//!    cached one.
//!
//! For a memo that does no work while nobody is listening, see
//! [`LazyMemo`](super::LazyMemo).

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use tracing::error;

use super::runtime::{with_runtime, Computation};
use super::signal::Equals;
use crate::graph::{NodeId, NodeKind};

/// A cached derived value that recomputes only when dependencies change.
///
/// The computation receives the previous value (`None` on the first run).
///
/// # Example
///
/// ```rust
/// use filament_core::{Memo, Signal};
///
/// let count = Signal::new(2);
/// let doubled = {
///     let count = count.clone();
///     Memo::new(move |_| count.get() * 2)
/// };
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T: 'static> {
    id: NodeId,
    inner: Rc<MemoInner<T>>,
}

struct MemoInner<T> {
    /// The computation function.
    compute: Box<dyn Fn(Option<&T>) -> T>,

    /// The cached value.
    value: RefCell<Option<T>>,

    equals: Equals<T>,

    /// While it returns false, runs keep the cached value and skip the
    /// computation.
    gate: Option<Box<dyn Fn() -> bool>>,
}

impl<T: 'static> Computation for MemoInner<T> {
    fn run(&self) -> bool {
        if let Some(gate) = &self.gate {
            if self.value.borrow().is_some() && !gate() {
                return false;
            }
        }

        let next = {
            let prev = self.value.borrow();
            (self.compute)(prev.as_ref())
        };

        let changed = match &*self.value.borrow() {
            Some(prev) => !self.equals.eq(prev, &next),
            None => true,
        };
        if changed {
            *self.value.borrow_mut() = Some(next);
        }
        changed
    }
}

impl<T: PartialEq + 'static> Memo<T> {
    /// Create a new memo that notifies only when its value changes.
    pub fn new(compute: impl Fn(Option<&T>) -> T + 'static) -> Self {
        Self::with_equality(compute, Equals::default())
    }
}

impl<T: 'static> Memo<T> {
    /// Create a new memo with a custom equality.
    pub fn with_equality(compute: impl Fn(Option<&T>) -> T + 'static, equals: Equals<T>) -> Self {
        Self::build(Box::new(compute), equals, None)
    }

    /// A memo whose recomputations are skipped while `gate` is closed. A
    /// skipped run reads nothing, so the memo loses its sources until it is
    /// invalidated again.
    pub(crate) fn gated(
        compute: impl Fn(Option<&T>) -> T + 'static,
        equals: Equals<T>,
        gate: impl Fn() -> bool + 'static,
    ) -> Self {
        Self::build(Box::new(compute), equals, Some(Box::new(gate)))
    }

    fn build(
        compute: Box<dyn Fn(Option<&T>) -> T>,
        equals: Equals<T>,
        gate: Option<Box<dyn Fn() -> bool>>,
    ) -> Self {
        let inner = Rc::new(MemoInner {
            compute,
            value: RefCell::new(None),
            equals,
            gate,
        });

        let id = with_runtime(|rt| {
            let id = rt.create_node(NodeKind::Memo);
            rt.register_computation(id, inner.clone());
            rt.batch(|| rt.update_if_needed(id));
            id
        });

        Self { id, inner }
    }

    /// Get the memo's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Borrow the current value, registering a dependency.
    ///
    /// A stale memo recomputes before `f` sees the value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_runtime(|rt| rt.track_read(self.id));
        self.with_untracked(f)
    }

    /// Borrow the current value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_runtime(|rt| rt.batch(|| rt.update_if_needed(self.id)));
        let value = self.inner.value.borrow();
        let Some(value) = value.as_ref() else {
            error!(node = self.id.raw(), "memo read itself during its first computation");
            panic!("cyclic read: memo {} has no value yet", self.id.raw());
        };
        f(value)
    }

    /// Force a recomputation on the next read or flush.
    pub(crate) fn invalidate(&self) {
        with_runtime(|rt| rt.invalidate(self.id));
    }

    /// Dispose the memo. The last value stays readable.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose(self.id));
    }

    /// Check if the memo has been disposed.
    pub fn is_disposed(&self) -> bool {
        with_runtime(|rt| rt.is_disposed(self.id))
    }

    /// Get the number of computations observing this memo.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.observer_count(self.id))
    }

    /// Get the number of sources read during the latest computation.
    pub fn source_count(&self) -> usize {
        with_runtime(|rt| rt.source_count(self.id))
    }
}

impl<T: Clone + 'static> Memo<T> {
    /// Get the current value, registering a dependency.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id)
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;
    use std::cell::Cell;

    #[test]
    fn memo_basic() {
        let memo = Memo::new(|_| 42);
        assert_eq!(memo.get(), 42);
    }

    #[test]
    fn memo_caches_value() {
        let call_count = Rc::new(Cell::new(0));
        let count = call_count.clone();
        let source = Signal::new(1);
        let read = source.clone();

        let memo = Memo::new(move |_| {
            count.set(count.get() + 1);
            read.get() * 10
        });

        // Computed once on creation, reads hit the cache
        assert_eq!(memo.get(), 10);
        assert_eq!(memo.get(), 10);
        assert_eq!(call_count.get(), 1);

        source.set(2);
        assert_eq!(memo.get(), 20);
        assert_eq!(call_count.get(), 2);
    }

    #[test]
    fn memo_receives_previous_value() {
        let tick = Signal::new(0);
        let read = tick.clone();
        let total = Memo::new(move |prev: Option<&i32>| prev.copied().unwrap_or(0) + read.get());

        tick.set(2);
        tick.set(3);
        assert_eq!(total.get(), 5);
    }

    #[test]
    fn memo_prunes_stale_sources() {
        let flag = Signal::new(true);
        let a = Signal::new(1);
        let b = Signal::new(2);
        let (f, ra, rb) = (flag.clone(), a.clone(), b.clone());

        let pick = Memo::new(move |_| if f.get() { ra.get() } else { rb.get() });
        assert_eq!(pick.source_count(), 2);
        assert_eq!(b.observer_count(), 0);

        flag.set(false);
        assert_eq!(pick.get(), 2);
        assert_eq!(a.observer_count(), 0);
        assert_eq!(b.observer_count(), 1);
    }
}
