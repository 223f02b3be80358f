//! Store values.
//!
//! A [`StoreValue`] is shaped like JSON, but its objects and arrays are
//! shared, mutable containers with reference identity. Two handles to the
//! same container compare equal; two structurally equal containers do not.
//! Diffing relies on this: an unchanged identity means "look inside", a
//! changed identity means "this whole subtree was replaced".
//!
//! Containers may form cycles. Debug output and JSON conversion detect
//! them; dropping a cyclic value leaks it, like any `Rc` cycle.

use std::cell::{Cell, Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};

use super::path::{Path, PathSegment};
use crate::error::StoreError;

/// A JSON-like value with shared containers.
#[derive(Clone, Default)]
pub enum StoreValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Array),
    Object(Object),
}

/// A shared array with a structural version.
///
/// Every mutation through this handle bumps the version.
#[derive(Clone, Default)]
pub struct Array(Rc<ArrayInner>);

#[derive(Default)]
struct ArrayInner {
    items: RefCell<Vec<StoreValue>>,
    version: Cell<u64>,
}

/// A shared object with insertion-ordered keys.
#[derive(Clone, Default)]
pub struct Object(Rc<RefCell<IndexMap<String, StoreValue>>>);

impl StoreValue {
    /// Build an object value.
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, StoreValue)>) -> Self {
        Self::Object(Object::from_entries(entries))
    }

    /// Build an array value.
    pub fn array(items: impl IntoIterator<Item = StoreValue>) -> Self {
        Self::Array(Array::new(items.into_iter().collect()))
    }

    /// Identity comparison: primitives by value, containers by reference.
    pub fn same(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => a.ptr_eq(b),
            (Self::Object(a), Self::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Address of the container, used as its identity.
    pub(crate) fn container_ptr(&self) -> Option<*const ()> {
        match self {
            Self::Array(array) => Some(Rc::as_ptr(&array.0).cast()),
            Self::Object(object) => Some(Rc::as_ptr(&object.0).cast()),
            _ => None,
        }
    }

    /// The child at `segment`, if this is a container holding one.
    pub fn child(&self, segment: &PathSegment) -> Option<StoreValue> {
        match (self, segment) {
            (Self::Object(object), PathSegment::Key(key)) => object.get(key),
            (Self::Array(array), PathSegment::Index(index)) => array.get(*index),
            _ => None,
        }
    }

    /// The value at `path`, if every step exists.
    pub fn at(&self, path: &Path) -> Option<StoreValue> {
        let mut current = self.clone();
        for segment in path.segments() {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Convert to JSON. Fails on reference cycles.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        let mut ancestors = Vec::new();
        let mut path = Path::root();
        self.to_json_inner(&mut ancestors, &mut path)
    }

    fn to_json_inner(
        &self,
        ancestors: &mut Vec<*const ()>,
        path: &mut Path,
    ) -> Result<serde_json::Value, StoreError> {
        use serde_json::Value;

        if let Some(ptr) = self.container_ptr() {
            if ancestors.contains(&ptr) {
                return Err(StoreError::Circular {
                    path: path.to_string(),
                });
            }
            ancestors.push(ptr);
        }

        let json = match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
            Self::String(s) => Value::String(s.to_string()),
            Self::Array(array) => {
                let mut items = Vec::with_capacity(array.len());
                for (index, item) in array.to_vec().iter().enumerate() {
                    path.push(PathSegment::Index(index));
                    items.push(item.to_json_inner(ancestors, path)?);
                    path.pop();
                }
                Value::Array(items)
            }
            Self::Object(object) => {
                let mut map = serde_json::Map::new();
                for (key, value) in object.entries() {
                    path.push(PathSegment::Key(key.clone()));
                    map.insert(key, value.to_json_inner(ancestors, path)?);
                    path.pop();
                }
                Value::Object(map)
            }
        };

        if self.is_container() {
            ancestors.pop();
        }
        Ok(json)
    }

    fn fmt_inner(&self, f: &mut fmt::Formatter<'_>, ancestors: &mut Vec<*const ()>) -> fmt::Result {
        if let Some(ptr) = self.container_ptr() {
            if ancestors.contains(&ptr) {
                return f.write_str("<cycle>");
            }
            ancestors.push(ptr);
        }
        match self {
            Self::Null => f.write_str("null")?,
            Self::Bool(b) => write!(f, "{b}")?,
            Self::Number(n) => write!(f, "{n}")?,
            Self::String(s) => write!(f, "{s:?}")?,
            Self::Array(array) => {
                f.write_str("[")?;
                for (i, item) in array.to_vec().iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    item.fmt_inner(f, ancestors)?;
                }
                f.write_str("]")?;
            }
            Self::Object(object) => {
                f.write_str("{")?;
                for (i, (key, value)) in object.entries().into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key:?}: ")?;
                    value.fmt_inner(f, ancestors)?;
                }
                f.write_str("}")?;
            }
        }
        if self.is_container() {
            ancestors.pop();
        }
        Ok(())
    }
}

impl PartialEq for StoreValue {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl fmt::Debug for StoreValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_inner(f, &mut Vec::new())
    }
}

impl Serialize for StoreValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json()
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

impl From<serde_json::Value> for StoreValue {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;

        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Value::String(s) => Self::String(s.into()),
            Value::Array(items) => Self::array(items.into_iter().map(Self::from)),
            Value::Object(map) => Self::object(map.into_iter().map(|(k, v)| (k, Self::from(v)))),
        }
    }
}

impl From<bool> for StoreValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for StoreValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for StoreValue {
    fn from(n: i32) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for StoreValue {
    fn from(s: &str) -> Self {
        Self::String(s.into())
    }
}

impl From<String> for StoreValue {
    fn from(s: String) -> Self {
        Self::String(s.into())
    }
}

impl From<Array> for StoreValue {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl From<Object> for StoreValue {
    fn from(object: Object) -> Self {
        Self::Object(object)
    }
}

impl Array {
    pub fn new(items: Vec<StoreValue>) -> Self {
        Self(Rc::new(ArrayInner {
            items: RefCell::new(items),
            version: Cell::new(0),
        }))
    }

    /// Structural version, bumped by every mutation.
    pub fn version(&self) -> u64 {
        self.0.version.get()
    }

    fn bump(&self) {
        self.0.version.set(self.0.version.get() + 1);
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.borrow().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<StoreValue> {
        self.0.items.borrow().get(index).cloned()
    }

    /// Borrow the items.
    pub fn items(&self) -> Ref<'_, Vec<StoreValue>> {
        self.0.items.borrow()
    }

    /// Clone the items out.
    pub fn to_vec(&self) -> Vec<StoreValue> {
        self.0.items.borrow().clone()
    }

    /// Replace the item at `index`. Returns `false` if it is out of bounds.
    pub fn set(&self, index: usize, value: StoreValue) -> bool {
        let mut items = self.0.items.borrow_mut();
        let Some(slot) = items.get_mut(index) else {
            return false;
        };
        *slot = value;
        drop(items);
        self.bump();
        true
    }

    pub fn push(&self, value: StoreValue) {
        self.0.items.borrow_mut().push(value);
        self.bump();
    }

    pub fn pop(&self) -> Option<StoreValue> {
        let popped = self.0.items.borrow_mut().pop();
        self.bump();
        popped
    }

    /// Insert at `index`, shifting later items. Out of bounds appends.
    pub fn insert(&self, index: usize, value: StoreValue) {
        let mut items = self.0.items.borrow_mut();
        let index = index.min(items.len());
        items.insert(index, value);
        drop(items);
        self.bump();
    }

    /// Remove the item at `index`, shifting later items.
    pub fn remove(&self, index: usize) -> Option<StoreValue> {
        let mut items = self.0.items.borrow_mut();
        if index >= items.len() {
            return None;
        }
        let removed = items.remove(index);
        drop(items);
        self.bump();
        Some(removed)
    }

    /// Replace `start..start + delete` with `insert`, returning the removed
    /// items. The range is clamped to the array.
    pub fn splice(
        &self,
        start: usize,
        delete: usize,
        insert: impl IntoIterator<Item = StoreValue>,
    ) -> Vec<StoreValue> {
        let mut items = self.0.items.borrow_mut();
        let start = start.min(items.len());
        let end = start.saturating_add(delete).min(items.len());
        let removed = items.splice(start..end, insert).collect();
        drop(items);
        self.bump();
        removed
    }

    pub fn truncate(&self, len: usize) {
        self.0.items.borrow_mut().truncate(len);
        self.bump();
    }

    /// Swap two items. Out-of-bounds indices are ignored.
    pub fn swap(&self, a: usize, b: usize) {
        let mut items = self.0.items.borrow_mut();
        if a < items.len() && b < items.len() {
            items.swap(a, b);
            drop(items);
            self.bump();
        }
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<K: Into<String>>(entries: impl IntoIterator<Item = (K, StoreValue)>) -> Self {
        Self(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    pub fn get(&self, key: &str) -> Option<StoreValue> {
        self.0.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.borrow().contains_key(key)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, key: impl Into<String>, value: StoreValue) -> Option<StoreValue> {
        self.0.borrow_mut().insert(key.into(), value)
    }

    /// Remove a key, keeping the order of the others.
    pub fn remove(&self, key: &str) -> Option<StoreValue> {
        self.0.borrow_mut().shift_remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.0.borrow().keys().cloned().collect()
    }

    /// Clone the entries out, in insertion order.
    pub fn entries(&self) -> Vec<(String, StoreValue)> {
        self.0
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.0.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&StoreValue::Array(self.clone()), f)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&StoreValue::Object(self.clone()), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identity_versus_structure() {
        let a = StoreValue::from(json!({ "x": 1 }));
        let b = StoreValue::from(json!({ "x": 1 }));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
        assert_eq!(StoreValue::from(1), StoreValue::from(1.0));
    }

    #[test]
    fn json_conversion() {
        let source = json!({ "todos": [{ "title": "write", "done": false }], "count": 1.5 });
        let value = StoreValue::from(source.clone());
        assert_eq!(value.to_json().unwrap(), source);
        assert_eq!(value.at(&Path::parse("todos[0].title")).unwrap().as_str(), Some("write"));
    }

    #[test]
    fn array_mutations_bump_the_version() {
        let array = Array::new(vec![1.into(), 2.into()]);
        let start = array.version();

        array.push(3.into());
        array.set(0, 10.into());
        array.swap(0, 1);
        array.splice(1, 1, [StoreValue::Null]);
        assert_eq!(array.version(), start + 4);
        assert!(!array.set(9, StoreValue::Null));
        assert_eq!(array.version(), start + 4);
    }

    #[test]
    fn cycles_are_detected() {
        let object = Object::new();
        object.insert("self", StoreValue::Object(object.clone()));
        let value = StoreValue::Object(object.clone());

        assert_eq!(
            value.to_json(),
            Err(StoreError::Circular { path: "self".into() })
        );
        assert_eq!(format!("{value:?}"), r#"{"self": <cycle>}"#);

        // Break the cycle so the test does not leak
        object.remove("self");
    }
}
