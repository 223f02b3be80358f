//! Reactive store.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::path::{Path, PathSegment};
use super::value::StoreValue;
use crate::error::StoreError;
use crate::graph::NodeId;
use crate::reactive::{batch, Equals, ReactiveContext, Signal};

/// A nested value with per-path dependency tracking.
///
/// Reading a path tracks that path only. Writing a path notifies readers of
/// that path and of every path below it; adding or removing a key also
/// notifies readers of the parent's keys. Every write notifies deep
/// trackers (see [`Store::track_deep`]).
///
/// Writes replace values in place inside the existing containers, so
/// containers that were not written keep their identity.
///
/// # Example
///
/// ```rust
/// use filament_core::store::{Store, StoreValue};
/// use serde_json::json;
///
/// let store = Store::new(json!({ "user": { "name": "Ada" } }).into());
/// store.set("user.name", "Grace".into()).unwrap();
/// assert_eq!(store.get("user.name").unwrap().as_str(), Some("Grace"));
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Rc<StoreInner>,
}

struct StoreInner {
    root: RefCell<StoreValue>,
    /// Owner at creation; triggers are created under it.
    owner: Option<NodeId>,
    paths: RefCell<HashMap<Path, Signal<()>>>,
    keys: RefCell<HashMap<Path, Signal<()>>>,
    deep: Signal<()>,
}

fn trigger() -> Signal<()> {
    Signal::with_equality((), Equals::Never)
}

impl Store {
    /// Create a store around `value`.
    pub fn new(value: StoreValue) -> Self {
        Self {
            inner: Rc::new(StoreInner {
                root: RefCell::new(value),
                owner: ReactiveContext::current_owner(),
                paths: RefCell::new(HashMap::new()),
                keys: RefCell::new(HashMap::new()),
                deep: trigger(),
            }),
        }
    }

    /// Read the value at `path`, tracking that path.
    ///
    /// Missing paths read as `None` and are tracked all the same, so a
    /// later write that creates them notifies the reader.
    pub fn get(&self, path: impl Into<Path>) -> Option<StoreValue> {
        let path = path.into();
        if ReactiveContext::is_tracking() {
            self.path_trigger(&path).with(|_| ());
        }
        self.inner.root.borrow().at(&path)
    }

    /// Read the value at `path` without tracking.
    pub fn get_untracked(&self, path: impl Into<Path>) -> Option<StoreValue> {
        self.inner.root.borrow().at(&path.into())
    }

    /// The keys of the object (or the indices of the array) at `path`,
    /// tracking additions and removals.
    pub fn keys(&self, path: impl Into<Path>) -> Vec<PathSegment> {
        let path = path.into();
        if ReactiveContext::is_tracking() {
            self.keys_trigger(&path).with(|_| ());
        }
        match self.inner.root.borrow().at(&path) {
            Some(StoreValue::Object(object)) => {
                object.keys().into_iter().map(PathSegment::Key).collect()
            }
            Some(StoreValue::Array(array)) => (0..array.len()).map(PathSegment::Index).collect(),
            _ => Vec::new(),
        }
    }

    /// Register a dependency on every write to the store.
    pub fn track_deep(&self) {
        self.inner.deep.with(|_| ());
    }

    /// The root value, untracked.
    pub fn snapshot(&self) -> StoreValue {
        self.inner.root.borrow().clone()
    }

    /// Write `value` at `path`.
    ///
    /// The parent of `path` must exist. An array index may be one past the
    /// end, which appends. Writing the identical value is a no-op.
    pub fn set(&self, path: impl Into<Path>, value: StoreValue) -> Result<(), StoreError> {
        let path = path.into();
        let Some((parent_path, segment)) = path.split_last() else {
            let unchanged = self.inner.root.borrow().same(&value);
            if !unchanged {
                *self.inner.root.borrow_mut() = value;
                self.notify_all();
            }
            return Ok(());
        };

        let parent = self.container(&parent_path)?;
        let key_added = match (&parent, segment) {
            (StoreValue::Object(object), PathSegment::Key(key)) => {
                if object.get(key).is_some_and(|current| current.same(&value)) {
                    return Ok(());
                }
                object.insert(key.clone(), value).is_none()
            }
            (StoreValue::Array(array), PathSegment::Index(index)) => {
                let len = array.len();
                if *index == len {
                    array.push(value);
                    true
                } else if *index > len {
                    return Err(StoreError::OutOfBounds {
                        path: parent_path.to_string(),
                        index: *index,
                        len,
                    });
                } else {
                    if array.get(*index).is_some_and(|current| current.same(&value)) {
                        return Ok(());
                    }
                    array.set(*index, value);
                    false
                }
            }
            (_, segment) => {
                return Err(StoreError::SegmentMismatch {
                    path: parent_path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };

        trace!(path = %path, key_added, "store write");
        batch(|| {
            self.notify_below(&path);
            if key_added {
                self.notify_keys(&parent_path);
            }
            self.inner.deep.notify();
        });
        Ok(())
    }

    /// Replace the value at `path` with `f` applied to the current one.
    pub fn update(
        &self,
        path: impl Into<Path>,
        f: impl FnOnce(Option<&StoreValue>) -> StoreValue,
    ) -> Result<(), StoreError> {
        let path = path.into();
        let current = self.get_untracked(path.clone());
        let next = f(current.as_ref());
        self.set(path, next)
    }

    /// Remove the value at `path`.
    ///
    /// Removing an array item shifts the items after it. Removing a missing
    /// key is a no-op.
    pub fn delete(&self, path: impl Into<Path>) -> Result<Option<StoreValue>, StoreError> {
        let path = path.into();
        let Some((parent_path, segment)) = path.split_last() else {
            return Err(StoreError::RootDeletion);
        };

        let parent = self.container(&parent_path)?;
        let removed = match (&parent, segment) {
            (StoreValue::Object(object), PathSegment::Key(key)) => object.remove(key),
            (StoreValue::Array(array), PathSegment::Index(index)) => array.remove(*index),
            (_, segment) => {
                return Err(StoreError::SegmentMismatch {
                    path: parent_path.to_string(),
                    segment: segment.to_string(),
                })
            }
        };

        if removed.is_some() {
            trace!(path = %path, "store delete");
            batch(|| {
                match segment {
                    // Every index from here on now holds a different item
                    PathSegment::Index(index) => self.notify_indices_from(&parent_path, *index),
                    PathSegment::Key(_) => self.notify_below(&path),
                }
                self.notify_keys(&parent_path);
                self.inner.deep.notify();
            });
        }
        Ok(removed)
    }

    /// Append `value` to the array at `path`.
    pub fn push(&self, path: impl Into<Path>, value: StoreValue) -> Result<(), StoreError> {
        let path = path.into();
        let array = match self.inner.root.borrow().at(&path) {
            Some(StoreValue::Array(array)) => array,
            Some(_) => {
                return Err(StoreError::NotAnArray {
                    path: path.to_string(),
                })
            }
            None => {
                return Err(StoreError::Missing {
                    path: path.to_string(),
                })
            }
        };
        let index = array.len();
        array.push(value);

        batch(|| {
            self.notify_below(&path.clone().index(index));
            self.notify_keys(&path);
            self.inner.deep.notify();
        });
        Ok(())
    }

    fn container(&self, path: &Path) -> Result<StoreValue, StoreError> {
        match self.inner.root.borrow().at(path) {
            Some(value) if value.is_container() => Ok(value),
            Some(_) => Err(StoreError::NotAContainer {
                path: path.to_string(),
            }),
            None => Err(StoreError::Missing {
                path: path.to_string(),
            }),
        }
    }

    fn path_trigger(&self, path: &Path) -> Signal<()> {
        Self::trigger_in(&self.inner.paths, path, self.inner.owner)
    }

    fn keys_trigger(&self, path: &Path) -> Signal<()> {
        Self::trigger_in(&self.inner.keys, path, self.inner.owner)
    }

    fn trigger_in(
        map: &RefCell<HashMap<Path, Signal<()>>>,
        path: &Path,
        owner: Option<NodeId>,
    ) -> Signal<()> {
        if let Some(signal) = map.borrow().get(path) {
            return signal.clone();
        }
        // Triggers live as long as the store, not as the first reader
        let _ctx = ReactiveContext::enter(None, owner);
        let signal = trigger();
        map.borrow_mut().insert(path.clone(), signal.clone());
        signal
    }

    fn notify_below(&self, prefix: &Path) {
        Self::prune(&self.inner.keys);
        let signals = Self::matching(&self.inner.paths, |path| path.starts_with(prefix));
        for signal in signals {
            signal.notify();
        }
    }

    fn notify_indices_from(&self, array_path: &Path, from: usize) {
        let depth = array_path.len();
        let signals = Self::matching(&self.inner.paths, |path| {
            path.starts_with(array_path)
                && matches!(path.segments().get(depth), Some(PathSegment::Index(i)) if *i >= from)
        });
        for signal in signals {
            signal.notify();
        }
    }

    fn notify_keys(&self, path: &Path) {
        Self::prune(&self.inner.keys);
        let signal = self.inner.keys.borrow().get(path).cloned();
        if let Some(signal) = signal {
            signal.notify();
        }
    }

    fn notify_all(&self) {
        batch(|| {
            for signal in Self::matching(&self.inner.paths, |_| true)
                .into_iter()
                .chain(Self::matching(&self.inner.keys, |_| true))
            {
                signal.notify();
            }
            self.inner.deep.notify();
        });
    }

    fn matching(
        map: &RefCell<HashMap<Path, Signal<()>>>,
        filter: impl Fn(&Path) -> bool,
    ) -> Vec<Signal<()>> {
        Self::prune(map);
        map.borrow()
            .iter()
            .filter(|(path, _)| filter(path))
            .map(|(_, signal)| signal.clone())
            .collect()
    }

    /// Drop the triggers no computation observes any more. A later tracked
    /// read of the same path creates a fresh one.
    fn prune(map: &RefCell<HashMap<Path, Signal<()>>>) {
        let mut unobserved = Vec::new();
        map.borrow_mut().retain(|_, signal| {
            let observed = signal.observer_count() > 0;
            if !observed {
                unobserved.push(signal.clone());
            }
            observed
        });
        if !unobserved.is_empty() {
            trace!(count = unobserved.len(), "pruning store triggers");
        }
        for signal in unobserved {
            signal.dispose();
        }
    }

    /// Number of paths with a live trigger, keys triggers included.
    pub fn tracked_paths(&self) -> usize {
        self.inner.paths.borrow().len() + self.inner.keys.borrow().len()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("root", &*self.inner.root.borrow())
            .field("tracked_paths", &self.inner.paths.borrow().len())
            .finish()
    }
}
