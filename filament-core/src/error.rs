//! Error types.
//!
//! Computation failures are panics that propagate out of the write that
//! triggered them; everything else that can fail returns one of these.

use thiserror::Error;

use crate::fs::FsAction;

/// Errors produced while loading a [`RuntimeConfig`](crate::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration could not be parsed.
    #[error("invalid runtime configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// A field holds a value the runtime cannot work with.
    #[error("invalid runtime configuration: `{field}` {reason}")]
    Invalid {
        /// Name of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Errors produced by [`Store`](crate::store::Store) path operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The parent of the target path does not exist.
    #[error("no value at `{path}`")]
    Missing {
        /// The path that could not be resolved.
        path: String,
    },

    /// A path segment addresses into a primitive value.
    #[error("`{path}` is not an object or array")]
    NotAContainer {
        /// The path of the primitive.
        path: String,
    },

    /// A key segment was used on an array or an index segment on an object.
    #[error("segment `{segment}` does not fit the container at `{path}`")]
    SegmentMismatch {
        /// The path of the container.
        path: String,
        /// The offending segment.
        segment: String,
    },

    /// An array index is past the end of the array.
    #[error("index {index} is out of bounds for `{path}` (length {len})")]
    OutOfBounds {
        /// The path of the array.
        path: String,
        /// The requested index.
        index: usize,
        /// The current length of the array.
        len: usize,
    },

    /// The operation needs an array at the path.
    #[error("`{path}` is not an array")]
    NotAnArray {
        /// The path that was expected to hold an array.
        path: String,
    },

    /// The root of a store can only be replaced, not deleted.
    #[error("the store root cannot be deleted")]
    RootDeletion,

    /// The value contains a reference cycle and cannot be serialized.
    #[error("value contains a circular reference at `{path}`")]
    Circular {
        /// The path at which the cycle closes.
        path: String,
    },
}

/// An error raised by a filesystem adapter, normalized with the context of
/// the call that produced it.
#[derive(Debug, Error)]
#[error("filesystem {action} failed for `{data}`{}", server_suffix(.server))]
pub struct AdapterError {
    /// The adapter operation that failed.
    pub action: FsAction,
    /// The path (or `from -> to` pair) the operation was called with.
    pub data: String,
    /// Whether this happened in a server build.
    pub server: bool,
    /// The adapter's own error.
    #[source]
    pub source: std::io::Error,
}

fn server_suffix(server: &bool) -> &'static str {
    if *server {
        " (server)"
    } else {
        ""
    }
}
