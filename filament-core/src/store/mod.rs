//! Stores
//!
//! A [`Store`] holds a nested, JSON-like [`StoreValue`] and tracks reads and
//! writes per [`Path`]. The diff engine in [`DiffCache`] turns successive
//! states of such a value into minimal structural diffs.
//!
//! # Identity
//!
//! Objects and arrays inside a store value are shared containers. Writes
//! go into the existing containers, so an untouched subtree keeps its
//! identity from one state to the next. Both fine-grained notification and
//! diffing rely on that.

mod diff;
mod path;
mod tracked;
mod value;

pub use diff::{
    capture_shallow_updates, capture_store_updates, DiffCache, NestedUpdate, ShallowCache,
    ShallowCapture, StoreCapture,
};
pub use path::{Path, PathSegment};
pub use tracked::Store;
pub use value::{Array, Object, StoreValue};
