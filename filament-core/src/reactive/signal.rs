//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (memo/effect), the
//!    running computation is registered as an observer.
//!
//! 2. When a signal's value changes, observers are marked dirty and
//!    scheduled. Writes that do not change the value (per the signal's
//!    equality) notify nobody.
//!
//! 3. The scheduled computations re-run when the outermost batch ends.
//!
//! # Ownership
//!
//! A signal belongs to the owner that was active when it was created. When
//! that owner is disposed, the signal is detached from the graph: reads and
//! writes keep working on the value but track and notify nothing.

use std::cell::RefCell;
use std::fmt::{self, Debug};
use std::rc::Rc;

use super::runtime::with_runtime;
use crate::graph::{NodeId, NodeKind};

/// How a reactive value decides whether a write is a change.
pub enum Equals<T> {
    /// Every write is a change.
    Never,
    /// Two values are equal if the function says so.
    By(Rc<dyn Fn(&T, &T) -> bool>),
}

impl<T> Equals<T> {
    /// Use a custom comparison.
    pub fn by(f: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self::By(Rc::new(f))
    }

    /// Whether `a` and `b` count as the same value.
    pub fn eq(&self, a: &T, b: &T) -> bool {
        match self {
            Self::Never => false,
            Self::By(f) => f(a, b),
        }
    }
}

impl<T: PartialEq + 'static> Default for Equals<T> {
    fn default() -> Self {
        Self::By(Rc::new(|a: &T, b: &T| a == b))
    }
}

impl<T> Clone for Equals<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Never => Self::Never,
            Self::By(f) => Self::By(f.clone()),
        }
    }
}

impl<T> Debug for Equals<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("Equals::Never"),
            Self::By(_) => f.write_str("Equals::By(..)"),
        }
    }
}

/// A reactive cell holding a value of type `T`.
///
/// Handles are cheap to clone; clones share the value.
///
/// # Example
///
/// ```rust
/// use filament_core::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (notifies observers)
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    /// Node in the dependency graph.
    id: NodeId,

    /// The current value, shared between handles.
    value: Rc<RefCell<T>>,

    equals: Equals<T>,
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Create a new signal that suppresses writes of an equal value.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, Equals::default())
    }
}

impl<T: 'static> Signal<T> {
    /// Create a new signal with a custom equality.
    pub fn with_equality(value: T, equals: Equals<T>) -> Self {
        let id = with_runtime(|rt| rt.create_node(NodeKind::Source));
        Self {
            id,
            value: Rc::new(RefCell::new(value)),
            equals,
        }
    }

    /// Get the signal's node ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Borrow the current value, registering a dependency.
    ///
    /// Writing to this signal from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        with_runtime(|rt| rt.track_read(self.id));
        self.with_untracked(f)
    }

    /// Borrow the current value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Set a new value, notifying observers if it differs from the current
    /// one.
    pub fn set(&self, value: T) {
        let unchanged = self.equals.eq(&self.value.borrow(), &value);
        if unchanged {
            return;
        }
        *self.value.borrow_mut() = value;
        with_runtime(|rt| rt.notify_changed(self.id));
    }

    /// Compute the next value from the current one and set it.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.value.borrow());
        self.set(next);
    }

    /// Mutate the value in place. Always notifies: equality cannot be
    /// checked after an in-place change.
    pub fn modify(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
        with_runtime(|rt| rt.notify_changed(self.id));
    }

    /// Replace the value without notifying anyone.
    pub fn set_untracked(&self, value: T) {
        *self.value.borrow_mut() = value;
    }

    /// Mutate the value in place without notifying anyone.
    pub fn update_untracked(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.value.borrow_mut());
    }

    /// Notify observers as if the value had changed.
    pub fn notify(&self) {
        with_runtime(|rt| rt.notify_changed(self.id));
    }

    /// Get the number of computations observing this signal.
    pub fn observer_count(&self) -> usize {
        with_runtime(|rt| rt.observer_count(self.id))
    }

    /// Remove the signal from the graph. The value stays readable; writes no
    /// longer notify anyone.
    pub fn dispose(&self) {
        with_runtime(|rt| rt.dispose(self.id));
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Get the current value, registering a dependency.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            value: self.value.clone(),
            equals: self.equals.clone(),
        }
    }
}

impl<T: Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id)
            .field("value", &*self.value.borrow())
            .field("observers", &self.observer_count())
            .finish()
    }
}
