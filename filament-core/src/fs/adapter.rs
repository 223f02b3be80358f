//! The adapter contract.

use std::io;

use serde::{Deserialize, Serialize};

/// What a path points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Dir,
}

/// A synchronous filesystem.
///
/// Paths passed in are already normalized (see [`normalize`]).
pub trait FsAdapter {
    /// `Ok(None)` when nothing exists at `path`.
    fn get_type(&self, path: &str) -> io::Result<Option<EntryType>>;

    /// Create a directory and any missing parents.
    fn mkdir(&self, path: &str) -> io::Result<()>;

    /// Names of the entries of a directory, sorted.
    fn readdir(&self, path: &str) -> io::Result<Vec<String>>;

    fn read_file(&self, path: &str) -> io::Result<String>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Remove a file, or a directory with everything below it.
    fn rm(&self, path: &str) -> io::Result<()>;

    /// Create or replace a file. The parent directory must exist.
    fn write_file(&self, path: &str, data: &str) -> io::Result<()>;
}

/// Collapse separators and make `path` absolute. `.` segments are
/// dropped; `..` is kept and left for adapters to reject.
pub fn normalize(path: &str) -> String {
    let mut out = String::from("/");
    for segment in path.split('/').filter(|s| !s.is_empty() && *s != ".") {
        if out.len() > 1 {
            out.push('/');
        }
        out.push_str(segment);
    }
    out
}

/// The parent of a normalized path; `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(at) => Some(&path[..at]),
        None => None,
    }
}

/// Whether normalized `path` is `ancestor` or lies below it.
pub(crate) fn is_within(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return true;
    }
    path == ancestor
        || path
            .strip_prefix(ancestor)
            .is_some_and(|rest| rest.starts_with('/'))
}

pub(crate) fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file or directory: {path}"))
}

pub(crate) fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_paths() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize("/a//b/"), "/a/b");
        assert_eq!(normalize("./a/./b"), "/a/b");
    }

    #[test]
    fn parents() {
        assert_eq!(parent("/"), None);
        assert_eq!(parent("/a"), Some("/"));
        assert_eq!(parent("/a/b"), Some("/a"));
    }

    #[test]
    fn containment() {
        assert!(is_within("/a/b", "/a"));
        assert!(is_within("/a", "/a"));
        assert!(!is_within("/ab", "/a"));
        assert!(is_within("/x", "/"));
    }
}
