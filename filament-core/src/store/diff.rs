//! Deep Store Diff Engine
//!
//! Computes minimal structural diffs of a store value between calls.
//!
//! # Algorithm
//!
//! A [`DiffCache`] keeps a cache tree that mirrors the shape of the value
//! seen on the previous call. Each cache node remembers the value it saw.
//! On the next call, for every node:
//!
//! 1. If the identity changed, one diff is reported for the whole subtree
//!    and the cached subtree is rebuilt. Nothing below is reported.
//! 2. If the identity is the same, the walk descends: keys that disappeared
//!    are reported as removals, new keys as additions, and surviving keys
//!    are compared recursively.
//! 3. Arrays carry a structural version. While it is unchanged only the
//!    cached items are compared; once it changed the array is re-walked by
//!    index, picking up additions and removals at the tail.
//!
//! The cache is keyed by path, not by container: a container reachable
//! through two paths gets two cache nodes. A container that is its own
//! ancestor on the current path is cached as a cycle marker and never
//! expanded, so cyclic values terminate.

use indexmap::IndexMap;
use serde::Serialize;

use super::path::{Path, PathSegment};
use super::tracked::Store;
use super::value::StoreValue;

/// One structural change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedUpdate {
    pub path: Path,
    /// The new value; `None` when the path was removed.
    pub value: Option<StoreValue>,
    /// The previous value; `None` when the path is new.
    pub prev: Option<StoreValue>,
}

impl NestedUpdate {
    fn changed(path: &Path, value: &StoreValue, prev: &StoreValue) -> Self {
        Self {
            path: path.clone(),
            value: Some(value.clone()),
            prev: Some(prev.clone()),
        }
    }

    fn added(path: &Path, value: &StoreValue) -> Self {
        Self {
            path: path.clone(),
            value: Some(value.clone()),
            prev: None,
        }
    }

    fn removed(path: &Path, prev: &StoreValue) -> Self {
        Self {
            path: path.clone(),
            value: None,
            prev: Some(prev.clone()),
        }
    }
}

#[derive(Debug)]
enum CacheNode {
    Leaf(StoreValue),
    /// A back-reference to an ancestor on the same path.
    Cycle(StoreValue),
    Array {
        value: StoreValue,
        version: u64,
        items: Vec<CacheNode>,
    },
    Object {
        value: StoreValue,
        entries: IndexMap<String, CacheNode>,
    },
}

impl CacheNode {
    fn value(&self) -> &StoreValue {
        match self {
            Self::Leaf(value) | Self::Cycle(value) => value,
            Self::Array { value, .. } | Self::Object { value, .. } => value,
        }
    }

    fn build(value: &StoreValue, ancestors: &mut Vec<*const ()>) -> Self {
        let Some(ptr) = value.container_ptr() else {
            return Self::Leaf(value.clone());
        };
        if ancestors.contains(&ptr) {
            return Self::Cycle(value.clone());
        }

        ancestors.push(ptr);
        let node = match value {
            StoreValue::Array(array) => Self::Array {
                value: value.clone(),
                version: array.version(),
                items: array
                    .to_vec()
                    .iter()
                    .map(|item| Self::build(item, ancestors))
                    .collect(),
            },
            StoreValue::Object(object) => Self::Object {
                value: value.clone(),
                entries: object
                    .entries()
                    .into_iter()
                    .map(|(key, item)| {
                        let node = Self::build(&item, ancestors);
                        (key, node)
                    })
                    .collect(),
            },
            _ => Self::Leaf(value.clone()),
        };
        ancestors.pop();
        node
    }

    fn compare(
        &mut self,
        value: &StoreValue,
        path: &mut Path,
        ancestors: &mut Vec<*const ()>,
        out: &mut Vec<NestedUpdate>,
    ) {
        if !self.value().same(value) {
            out.push(NestedUpdate::changed(path, value, self.value()));
            *self = Self::build(value, ancestors);
            return;
        }

        match self {
            Self::Leaf(_) | Self::Cycle(_) => {}
            Self::Array {
                value: StoreValue::Array(array),
                version,
                items,
            } => {
                ancestors.extend(value.container_ptr());
                let current = array.to_vec();

                if array.version() == *version {
                    for (index, (node, item)) in items.iter_mut().zip(&current).enumerate() {
                        path.push(PathSegment::Index(index));
                        node.compare(item, path, ancestors, out);
                        path.pop();
                    }
                } else {
                    for (index, item) in current.iter().enumerate() {
                        path.push(PathSegment::Index(index));
                        match items.get_mut(index) {
                            Some(node) => node.compare(item, path, ancestors, out),
                            None => {
                                out.push(NestedUpdate::added(path, item));
                                items.push(Self::build(item, ancestors));
                            }
                        }
                        path.pop();
                    }
                    for (index, node) in items.iter().enumerate().skip(current.len()) {
                        path.push(PathSegment::Index(index));
                        out.push(NestedUpdate::removed(path, node.value()));
                        path.pop();
                    }
                    items.truncate(current.len());
                    *version = array.version();
                }
                ancestors.pop();
            }
            Self::Object {
                value: StoreValue::Object(object),
                entries,
            } => {
                ancestors.extend(value.container_ptr());
                let current = object.entries();

                entries.retain(|key, node| {
                    if current.iter().any(|(k, _)| k == key) {
                        return true;
                    }
                    path.push(PathSegment::Key(key.clone()));
                    out.push(NestedUpdate::removed(path, node.value()));
                    path.pop();
                    false
                });

                for (key, item) in &current {
                    path.push(PathSegment::Key(key.clone()));
                    match entries.get_mut(key) {
                        Some(node) => node.compare(item, path, ancestors, out),
                        None => {
                            out.push(NestedUpdate::added(path, item));
                            entries.insert(key.clone(), Self::build(item, ancestors));
                        }
                    }
                    path.pop();
                }
                ancestors.pop();
            }
            // A cached container always holds a container of its own kind
            Self::Array { .. } | Self::Object { .. } => {}
        }
    }
}

/// Persistent cache for deep diffs of one value over time.
///
/// ```rust
/// use filament_core::store::{DiffCache, Path, StoreValue};
/// use serde_json::json;
///
/// let value = StoreValue::from(json!({ "a": { "b": 1 } }));
/// let mut cache = DiffCache::new();
/// assert_eq!(cache.compare(&value).len(), 1);
///
/// value.at(&Path::parse("a")).unwrap().as_object().unwrap().insert("b", 2.into());
/// let diffs = cache.compare(&value);
/// assert_eq!(diffs.len(), 1);
/// assert_eq!(diffs[0].path, Path::parse("a.b"));
/// ```
#[derive(Debug, Default)]
pub struct DiffCache {
    root: Option<CacheNode>,
}

impl DiffCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare `value` against the cache and update the cache.
    ///
    /// The first call reports a single diff at the root path.
    pub fn compare(&mut self, value: &StoreValue) -> Vec<NestedUpdate> {
        let mut ancestors = Vec::new();
        let mut path = Path::root();

        let Some(root) = self.root.as_mut() else {
            self.root = Some(CacheNode::build(value, &mut ancestors));
            return vec![NestedUpdate::added(&path, value)];
        };

        let mut out = Vec::new();
        root.compare(value, &mut path, &mut ancestors, &mut out);
        out
    }

    /// Forget everything; the next call reports the whole value again.
    pub fn reset(&mut self) {
        self.root = None;
    }
}

/// Cache for shallow diffs: only top-level keys are compared, by identity.
///
/// In-place changes below the top level are not reported; a top-level key
/// is reported when its value was replaced, added or removed.
#[derive(Debug, Default)]
pub struct ShallowCache {
    root: Option<StoreValue>,
    children: IndexMap<PathSegment, StoreValue>,
}

impl ShallowCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compare(&mut self, value: &StoreValue) -> Vec<NestedUpdate> {
        let root_path = Path::root();
        let current = top_level(value);

        let Some(root) = self.root.replace(value.clone()) else {
            self.children = current;
            return vec![NestedUpdate::added(&root_path, value)];
        };
        if !root.same(value) {
            self.children = current;
            return vec![NestedUpdate::changed(&root_path, value, &root)];
        }

        let mut out = Vec::new();
        for (segment, prev) in &self.children {
            if !current.contains_key(segment) {
                out.push(NestedUpdate::removed(&Path::from_iter([segment.clone()]), prev));
            }
        }
        for (segment, item) in &current {
            let path = Path::from_iter([segment.clone()]);
            match self.children.get(segment) {
                Some(prev) if prev.same(item) => {}
                Some(prev) => out.push(NestedUpdate::changed(&path, item, prev)),
                None => out.push(NestedUpdate::added(&path, item)),
            }
        }
        self.children = current;
        out
    }
}

fn top_level(value: &StoreValue) -> IndexMap<PathSegment, StoreValue> {
    match value {
        StoreValue::Object(object) => object
            .entries()
            .into_iter()
            .map(|(key, item)| (PathSegment::Key(key), item))
            .collect(),
        StoreValue::Array(array) => array
            .to_vec()
            .into_iter()
            .enumerate()
            .map(|(index, item)| (PathSegment::Index(index), item))
            .collect(),
        _ => IndexMap::new(),
    }
}

/// Tracks every write to a store and reports them as deep diffs.
///
/// Each call to [`updates`](Self::updates) registers a dependency on every
/// write to the store and returns the changes since the previous call.
pub struct StoreCapture {
    store: Store,
    cache: std::cell::RefCell<DiffCache>,
}

impl StoreCapture {
    pub fn updates(&self) -> Vec<NestedUpdate> {
        self.store.track_deep();
        self.cache.borrow_mut().compare(&self.store.snapshot())
    }
}

/// Like [`StoreCapture`], but reports top-level changes only.
pub struct ShallowCapture {
    store: Store,
    cache: std::cell::RefCell<ShallowCache>,
}

impl ShallowCapture {
    pub fn updates(&self) -> Vec<NestedUpdate> {
        self.store.track_deep();
        self.cache.borrow_mut().compare(&self.store.snapshot())
    }
}

/// Capture deep diffs of `store`.
///
/// ```rust
/// use filament_core::store::{capture_store_updates, Path, Store};
/// use serde_json::json;
///
/// let store = Store::new(json!({ "todos": [] }).into());
/// let capture = capture_store_updates(&store);
/// assert_eq!(capture.updates()[0].path, Path::root());
///
/// store.push("todos", "write docs".into()).unwrap();
/// let diffs = capture.updates();
/// assert_eq!(diffs[0].path, Path::parse("todos[0]"));
/// assert!(diffs[0].prev.is_none());
/// ```
pub fn capture_store_updates(store: &Store) -> StoreCapture {
    StoreCapture {
        store: store.clone(),
        cache: Default::default(),
    }
}

/// Capture top-level diffs of `store`.
pub fn capture_shallow_updates(store: &Store) -> ShallowCapture {
    ShallowCapture {
        store: store.clone(),
        cache: Default::default(),
    }
}
