//! In-memory adapter.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io;
use std::rc::Rc;

use super::adapter::{invalid, is_within, not_found, parent, EntryType, FsAdapter};

#[derive(Debug, Clone)]
enum Entry {
    Dir,
    File(String),
}

/// A filesystem held in memory. Clones share the same tree.
///
/// ```rust
/// use filament_core::fs::{EntryType, FsAdapter, MemoryFs};
///
/// let fs = MemoryFs::new();
/// fs.mkdir("/src").unwrap();
/// fs.write_file("/src/main.rs", "fn main() {}").unwrap();
/// assert_eq!(fs.get_type("/src").unwrap(), Some(EntryType::Dir));
/// assert_eq!(fs.readdir("/src").unwrap(), vec!["main.rs"]);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryFs {
    entries: Rc<RefCell<BTreeMap<String, Entry>>>,
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFs {
    /// An empty filesystem holding only the root directory.
    pub fn new() -> Self {
        let mut entries = BTreeMap::new();
        entries.insert("/".to_owned(), Entry::Dir);
        Self {
            entries: Rc::new(RefCell::new(entries)),
        }
    }

    fn require_dir(entries: &BTreeMap<String, Entry>, path: &str) -> io::Result<()> {
        match entries.get(path) {
            Some(Entry::Dir) => Ok(()),
            Some(Entry::File(_)) => Err(invalid(format!("not a directory: {path}"))),
            None => Err(not_found(path)),
        }
    }

    fn reject_dots(path: &str) -> io::Result<()> {
        if path.split('/').any(|segment| segment == "..") {
            return Err(invalid(format!("path escapes the root: {path}")));
        }
        Ok(())
    }
}

impl FsAdapter for MemoryFs {
    fn get_type(&self, path: &str) -> io::Result<Option<EntryType>> {
        Ok(self.entries.borrow().get(path).map(|entry| match entry {
            Entry::Dir => EntryType::Dir,
            Entry::File(_) => EntryType::File,
        }))
    }

    fn mkdir(&self, path: &str) -> io::Result<()> {
        Self::reject_dots(path)?;
        let mut entries = self.entries.borrow_mut();
        let mut chain = vec![path];
        let mut current = path;
        while let Some(up) = parent(current) {
            chain.push(up);
            current = up;
        }
        for dir in chain.into_iter().rev() {
            match entries.get(dir) {
                Some(Entry::Dir) => {}
                Some(Entry::File(_)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("a file exists at {dir}"),
                    ))
                }
                None => {
                    entries.insert(dir.to_owned(), Entry::Dir);
                }
            }
        }
        Ok(())
    }

    fn readdir(&self, path: &str) -> io::Result<Vec<String>> {
        let entries = self.entries.borrow();
        Self::require_dir(&entries, path)?;
        Ok(entries
            .keys()
            .filter(|key| key.as_str() != path && parent(key) == Some(path))
            .filter_map(|key| key.rsplit('/').next())
            .map(str::to_owned)
            .collect())
    }

    fn read_file(&self, path: &str) -> io::Result<String> {
        match self.entries.borrow().get(path) {
            Some(Entry::File(data)) => Ok(data.clone()),
            Some(Entry::Dir) => Err(invalid(format!("is a directory: {path}"))),
            None => Err(not_found(path)),
        }
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        Self::reject_dots(to)?;
        if from == "/" {
            return Err(invalid("the root cannot be renamed"));
        }
        if to != from && is_within(to, from) {
            return Err(invalid(format!("cannot move {from} into itself")));
        }
        let mut entries = self.entries.borrow_mut();
        if !entries.contains_key(from) {
            return Err(not_found(from));
        }
        let target_parent = parent(to).ok_or_else(|| invalid("cannot replace the root"))?;
        Self::require_dir(&entries, target_parent)?;
        if matches!(entries.get(to), Some(Entry::Dir)) && to != from {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("a directory exists at {to}"),
            ));
        }

        let moved: Vec<String> = entries
            .keys()
            .filter(|key| is_within(key, from))
            .cloned()
            .collect();
        for key in moved {
            if let Some(entry) = entries.remove(&key) {
                let renamed = format!("{to}{}", &key[from.len()..]);
                entries.insert(renamed, entry);
            }
        }
        Ok(())
    }

    fn rm(&self, path: &str) -> io::Result<()> {
        if path == "/" {
            return Err(invalid("the root cannot be removed"));
        }
        let mut entries = self.entries.borrow_mut();
        if !entries.contains_key(path) {
            return Err(not_found(path));
        }
        entries.retain(|key, _| !is_within(key, path));
        Ok(())
    }

    fn write_file(&self, path: &str, data: &str) -> io::Result<()> {
        Self::reject_dots(path)?;
        let mut entries = self.entries.borrow_mut();
        let dir = parent(path).ok_or_else(|| invalid("cannot write to the root"))?;
        Self::require_dir(&entries, dir)?;
        if let Some(Entry::Dir) = entries.get(path) {
            return Err(invalid(format!("is a directory: {path}")));
        }
        entries.insert(path.to_owned(), Entry::File(data.to_owned()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mkdir_creates_parents() {
        let fs = MemoryFs::new();
        fs.mkdir("/a/b/c").unwrap();
        assert_eq!(fs.readdir("/").unwrap(), vec!["a"]);
        assert_eq!(fs.readdir("/a/b").unwrap(), vec!["c"]);
        fs.mkdir("/a/b").unwrap();
    }

    #[test]
    fn write_needs_a_parent() {
        let fs = MemoryFs::new();
        let err = fs.write_file("/missing/file.txt", "x").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn rename_moves_subtree() {
        let fs = MemoryFs::new();
        fs.mkdir("/src/nested").unwrap();
        fs.write_file("/src/nested/a.txt", "a").unwrap();

        fs.rename("/src", "/lib").unwrap();
        assert_eq!(fs.get_type("/src").unwrap(), None);
        assert_eq!(fs.read_file("/lib/nested/a.txt").unwrap(), "a");
        assert!(fs.rename("/lib", "/lib/inner").is_err());
    }

    #[test]
    fn rm_is_recursive() {
        let fs = MemoryFs::new();
        fs.mkdir("/a/b").unwrap();
        fs.write_file("/a/b/f", "x").unwrap();
        fs.write_file("/ab", "y").unwrap();

        fs.rm("/a").unwrap();
        assert_eq!(fs.readdir("/").unwrap(), vec!["ab"]);
        assert_eq!(fs.rm("/a").unwrap_err().kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn rejects_parent_segments() {
        let fs = MemoryFs::new();
        assert_eq!(
            fs.mkdir("/a/../b").unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }
}
