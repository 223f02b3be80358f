//! Reactive Filesystem
//!
//! A thin caching layer over a synchronous [`FsAdapter`]. [`ReactiveFs`]
//! keeps one signal per path for types, directory listings and file
//! contents, so reads inside effects re-run when a mutation through the
//! same `ReactiveFs` touches that path or its parent listing.
//!
//! Two adapters ship with the crate: [`MemoryFs`] and [`NativeFs`].
//!
//! Paths are `/`-separated and always absolute within the adapter;
//! `"a/b"`, `"/a/b/"` and `"/a//b"` all name the same entry.

mod adapter;
mod memory;
mod native;
mod reactive;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use adapter::{normalize, parent, EntryType, FsAdapter};
pub use memory::MemoryFs;
pub use native::NativeFs;
pub use reactive::{ErrorPolicy, ReactiveFs};

/// The adapter operation an [`AdapterError`](crate::error::AdapterError)
/// came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsAction {
    GetType,
    Mkdir,
    Readdir,
    ReadFile,
    Rename,
    Rm,
    WriteFile,
}

impl FsAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetType => "get_type",
            Self::Mkdir => "mkdir",
            Self::Readdir => "readdir",
            Self::ReadFile => "read_file",
            Self::Rename => "rename",
            Self::Rm => "rm",
            Self::WriteFile => "write_file",
        }
    }
}

impl fmt::Display for FsAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
