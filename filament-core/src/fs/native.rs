//! `std::fs` adapter.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use super::adapter::{invalid, EntryType, FsAdapter};

/// The host filesystem below a base directory. Adapter paths are relative
/// to `base`; `..` segments are rejected.
#[derive(Debug, Clone)]
pub struct NativeFs {
    base: PathBuf,
}

impl NativeFs {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, path: &str) -> io::Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.base.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(invalid(format!("path escapes the base directory: {path}"))),
            }
        }
        Ok(resolved)
    }
}

impl FsAdapter for NativeFs {
    fn get_type(&self, path: &str) -> io::Result<Option<EntryType>> {
        match fs::metadata(self.resolve(path)?) {
            Ok(meta) if meta.is_dir() => Ok(Some(EntryType::Dir)),
            Ok(_) => Ok(Some(EntryType::File)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn mkdir(&self, path: &str) -> io::Result<()> {
        fs::create_dir_all(self.resolve(path)?)
    }

    fn readdir(&self, path: &str) -> io::Result<Vec<String>> {
        let mut names = fs::read_dir(self.resolve(path)?)?
            .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn read_file(&self, path: &str) -> io::Result<String> {
        fs::read_to_string(self.resolve(path)?)
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        fs::rename(self.resolve(from)?, self.resolve(to)?)
    }

    fn rm(&self, path: &str) -> io::Result<()> {
        let target = self.resolve(path)?;
        if target == self.base {
            return Err(invalid("the base directory cannot be removed"));
        }
        if fs::symlink_metadata(&target)?.is_dir() {
            fs::remove_dir_all(target)
        } else {
            fs::remove_file(target)
        }
    }

    fn write_file(&self, path: &str, data: &str) -> io::Result<()> {
        fs::write(self.resolve(path)?, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn scratch() -> PathBuf {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("filament_fs_{unique}"));
        fs::create_dir_all(&dir).expect("create scratch dir");
        dir
    }

    #[test]
    fn round_trip_through_disk() {
        let dir = scratch();
        let native = NativeFs::new(&dir);

        native.mkdir("/docs/notes").unwrap();
        native.write_file("/docs/readme.md", "hi").unwrap();
        assert_eq!(native.readdir("/docs").unwrap(), vec!["notes", "readme.md"]);
        assert_eq!(native.get_type("/docs/readme.md").unwrap(), Some(EntryType::File));

        native.rename("/docs/readme.md", "/docs/notes/readme.md").unwrap();
        assert_eq!(native.read_file("/docs/notes/readme.md").unwrap(), "hi");

        native.rm("/docs").unwrap();
        assert_eq!(native.get_type("/docs").unwrap(), None);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_escapes() {
        let native = NativeFs::new(std::env::temp_dir());
        let err = native.read_file("/../etc/passwd").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(native.rm("/").is_err());
    }
}
