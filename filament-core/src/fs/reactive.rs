//! Signal cache over an adapter.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::Rc;

use tracing::{debug, error};

use super::adapter::{is_within, normalize, parent, EntryType, FsAdapter};
use super::FsAction;
use crate::config::is_server;
use crate::error::AdapterError;
use crate::graph::NodeId;
use crate::reactive::{batch, ReactiveContext, Signal};

/// What happens to adapter errors.
#[derive(Clone, Default)]
pub enum ErrorPolicy {
    /// Return them to the caller.
    #[default]
    Throw,
    /// Hand them to a callback; the call then succeeds with an empty
    /// value (no type, no entries, no content).
    Report(Rc<dyn Fn(&AdapterError)>),
}

impl ErrorPolicy {
    pub fn report(on_error: impl Fn(&AdapterError) + 'static) -> Self {
        Self::Report(Rc::new(on_error))
    }
}

impl fmt::Debug for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Throw => f.write_str("Throw"),
            Self::Report(_) => f.write_str("Report(..)"),
        }
    }
}

type Cache<T> = RefCell<HashMap<String, Signal<T>>>;
type Fetch<A, T> = fn(&Inner<A>, &str) -> Result<T, AdapterError>;

/// Reactive reads over an [`FsAdapter`].
///
/// Every path read through `get_type`, `readdir` or `read_file` gets a
/// cached signal, so reads inside effects and memos are tracked. Mutations
/// made through this value refetch the cached entries of the mutated path,
/// of everything below it, and of its parent, all in one batch. Changes
/// made behind its back are not seen.
///
/// # Example
///
/// ```rust
/// use filament_core::fs::{MemoryFs, ReactiveFs};
/// use filament_core::Effect;
///
/// let fs = ReactiveFs::new(MemoryFs::new());
///
/// let reader = fs.clone();
/// let listing = Effect::new(move |_| reader.readdir("/").unwrap());
///
/// fs.write_file("/notes.txt", "hello").unwrap();
/// assert_eq!(listing.run_count(), 2);
/// assert_eq!(fs.read_file("/notes.txt").unwrap().as_deref(), Some("hello"));
/// ```
pub struct ReactiveFs<A: 'static> {
    inner: Rc<Inner<A>>,
}

struct Inner<A> {
    adapter: A,
    policy: ErrorPolicy,
    owner: Option<NodeId>,
    types: Cache<Option<EntryType>>,
    listings: Cache<Vec<String>>,
    files: Cache<Option<String>>,
}

impl<A: FsAdapter + 'static> ReactiveFs<A> {
    pub fn new(adapter: A) -> Self {
        Self::with_policy(adapter, ErrorPolicy::default())
    }

    pub fn with_policy(adapter: A, policy: ErrorPolicy) -> Self {
        Self {
            inner: Rc::new(Inner {
                adapter,
                policy,
                owner: ReactiveContext::current_owner(),
                types: RefCell::default(),
                listings: RefCell::default(),
                files: RefCell::default(),
            }),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.inner.adapter
    }

    /// What `path` points at, tracked. `None` when nothing is there.
    pub fn get_type(&self, path: &str) -> Result<Option<EntryType>, AdapterError> {
        let path = normalize(path);
        let signal = self.inner.cached(&self.inner.types, &path, Inner::fetch_type)?;
        Ok(signal.get())
    }

    /// The entries of a directory, tracked. Empty when it does not exist.
    pub fn readdir(&self, path: &str) -> Result<Vec<String>, AdapterError> {
        let path = normalize(path);
        let signal = self
            .inner
            .cached(&self.inner.listings, &path, Inner::fetch_listing)?;
        Ok(signal.get())
    }

    /// The content of a file, tracked. `None` when it does not exist.
    pub fn read_file(&self, path: &str) -> Result<Option<String>, AdapterError> {
        let path = normalize(path);
        let signal = self.inner.cached(&self.inner.files, &path, Inner::fetch_file)?;
        Ok(signal.get())
    }

    pub fn mkdir(&self, path: &str) -> Result<(), AdapterError> {
        let path = normalize(path);
        let result = self.inner.adapter.mkdir(&path);
        self.inner.mutated(FsAction::Mkdir, &path, result, &[&path])
    }

    pub fn write_file(&self, path: &str, data: &str) -> Result<(), AdapterError> {
        let path = normalize(path);
        let result = self.inner.adapter.write_file(&path, data);
        self.inner.mutated(FsAction::WriteFile, &path, result, &[&path])
    }

    pub fn rename(&self, from: &str, to: &str) -> Result<(), AdapterError> {
        let (from, to) = (normalize(from), normalize(to));
        let result = self.inner.adapter.rename(&from, &to);
        let data = format!("{from} -> {to}");
        self.inner
            .mutated(FsAction::Rename, &data, result, &[&from, &to])
    }

    pub fn rm(&self, path: &str) -> Result<(), AdapterError> {
        let path = normalize(path);
        let result = self.inner.adapter.rm(&path);
        self.inner.mutated(FsAction::Rm, &path, result, &[&path])
    }

    /// Number of paths with at least one cached signal.
    pub fn cached_paths(&self) -> usize {
        let mut paths: Vec<String> = self.inner.types.borrow().keys().cloned().collect();
        paths.extend(self.inner.listings.borrow().keys().cloned());
        paths.extend(self.inner.files.borrow().keys().cloned());
        paths.sort();
        paths.dedup();
        paths.len()
    }
}

impl<A: FsAdapter> Inner<A> {
    fn error(&self, action: FsAction, data: &str, source: io::Error) -> AdapterError {
        AdapterError {
            action,
            data: data.to_owned(),
            server: is_server(),
            source,
        }
    }

    fn fetch_type(&self, path: &str) -> Result<Option<EntryType>, AdapterError> {
        self.adapter
            .get_type(path)
            .map_err(|err| self.error(FsAction::GetType, path, err))
    }

    fn fetch_listing(&self, path: &str) -> Result<Vec<String>, AdapterError> {
        match self.adapter.readdir(path) {
            Ok(names) => Ok(names),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(self.error(FsAction::Readdir, path, err)),
        }
    }

    fn fetch_file(&self, path: &str) -> Result<Option<String>, AdapterError> {
        match self.adapter.read_file(path) {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.error(FsAction::ReadFile, path, err)),
        }
    }

    /// Apply the error policy.
    fn settle<T: Default>(&self, result: Result<T, AdapterError>) -> Result<T, AdapterError> {
        match (result, &self.policy) {
            (Ok(value), _) => Ok(value),
            (Err(err), ErrorPolicy::Throw) => Err(err),
            (Err(err), ErrorPolicy::Report(on_error)) => {
                error!(action = %err.action, data = %err.data, error = %err.source, "filesystem error");
                on_error(&err);
                Ok(T::default())
            }
        }
    }

    fn cached<T: Clone + Default + PartialEq + 'static>(
        &self,
        cache: &Cache<T>,
        path: &str,
        fetch: Fetch<A, T>,
    ) -> Result<Signal<T>, AdapterError> {
        if let Some(signal) = cache.borrow().get(path) {
            return Ok(signal.clone());
        }
        let value = self.settle(fetch(self, path))?;
        // Cached signals live as long as this value, not as the first reader
        let signal = {
            let _ctx = ReactiveContext::enter(None, self.owner);
            Signal::new(value)
        };
        cache.borrow_mut().insert(path.to_owned(), signal.clone());
        Ok(signal)
    }

    fn mutated(
        &self,
        action: FsAction,
        data: &str,
        result: io::Result<()>,
        paths: &[&str],
    ) -> Result<(), AdapterError> {
        if let Err(err) = result {
            return self.settle(Err(self.error(action, data, err)));
        }
        let affected = |key: &str| {
            paths
                .iter()
                .any(|path| is_within(key, path) || parent(path) == Some(key))
        };
        batch(|| {
            self.refresh(&self.types, &affected, Self::fetch_type)?;
            self.refresh(&self.listings, &affected, Self::fetch_listing)?;
            self.refresh(&self.files, &affected, Self::fetch_file)
        })
    }

    fn refresh<T: Default + PartialEq + 'static>(
        &self,
        cache: &Cache<T>,
        affected: &dyn Fn(&str) -> bool,
        fetch: Fetch<A, T>,
    ) -> Result<(), AdapterError> {
        // Entries nobody observes are dropped rather than refetched
        let (mut stale, mut unobserved) = (Vec::new(), Vec::new());
        cache.borrow_mut().retain(|path, signal: &mut Signal<T>| {
            if !affected(path) {
                return true;
            }
            if signal.observer_count() == 0 {
                unobserved.push(signal.clone());
                return false;
            }
            stale.push((path.clone(), signal.clone()));
            true
        });
        for signal in unobserved {
            signal.dispose();
        }
        for (path, signal) in stale {
            debug!(path = %path, "refetching");
            let value = self.settle(fetch(self, &path))?;
            signal.set(value);
        }
        Ok(())
    }
}

impl<A: 'static> Clone for ReactiveFs<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A: fmt::Debug + 'static> fmt::Debug for ReactiveFs<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveFs")
            .field("adapter", &self.inner.adapter)
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFs;
    use crate::reactive::Effect;
    use std::cell::Cell;

    #[test]
    fn listing_follows_writes() {
        let fs = ReactiveFs::new(MemoryFs::new());
        let seen = Rc::new(RefCell::new(Vec::new()));

        let (reader, log) = (fs.clone(), seen.clone());
        let _effect = Effect::new(move |_| {
            log.borrow_mut().push(reader.readdir("/").unwrap());
        });

        fs.mkdir("/docs").unwrap();
        fs.write_file("/a.txt", "a").unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                vec![],
                vec!["docs".to_owned()],
                vec!["a.txt".to_owned(), "docs".to_owned()],
            ]
        );
    }

    #[test]
    fn unrelated_writes_do_not_rerun_readers() {
        let fs = ReactiveFs::new(MemoryFs::new());
        fs.mkdir("/docs").unwrap();

        let reader = fs.clone();
        let effect = Effect::new(move |_| reader.read_file("/other.txt").unwrap());

        fs.write_file("/docs/a.txt", "a").unwrap();
        assert_eq!(effect.run_count(), 1);

        fs.write_file("/other.txt", "o").unwrap();
        assert_eq!(effect.run_count(), 2);
        assert_eq!(fs.read_file("/other.txt").unwrap().as_deref(), Some("o"));
    }

    #[test]
    fn rename_and_rm_refetch_both_sides() {
        let fs = ReactiveFs::new(MemoryFs::new());
        fs.mkdir("/dir").unwrap();
        fs.write_file("/dir/a", "x").unwrap();
        assert_eq!(fs.read_file("/dir/a").unwrap().as_deref(), Some("x"));
        assert_eq!(fs.get_type("/b").unwrap(), None);

        fs.rename("/dir/a", "/b").unwrap();
        assert_eq!(fs.read_file("/dir/a").unwrap(), None);
        assert_eq!(fs.get_type("/b").unwrap(), Some(EntryType::File));

        fs.rm("/dir").unwrap();
        assert_eq!(fs.get_type("/dir").unwrap(), None);
        // The unobserved "/dir/a" entry was dropped by the rm
        assert_eq!(fs.cached_paths(), 2);
    }

    #[test]
    fn unobserved_entries_are_dropped_on_mutation() {
        let fs = ReactiveFs::new(MemoryFs::new());
        fs.write_file("/a", "1").unwrap();
        fs.write_file("/b", "1").unwrap();
        assert_eq!(fs.read_file("/a").unwrap().as_deref(), Some("1"));

        let reader = fs.clone();
        let effect = Effect::new(move |_| reader.read_file("/b").unwrap());
        assert_eq!(fs.cached_paths(), 2);

        fs.write_file("/a", "2").unwrap();
        fs.write_file("/b", "2").unwrap();
        assert_eq!(fs.cached_paths(), 1);
        assert_eq!(effect.run_count(), 2);
        assert_eq!(fs.read_file("/a").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn errors_are_returned_by_default() {
        let fs = ReactiveFs::new(MemoryFs::new());
        let err = fs.write_file("/missing/a.txt", "x").unwrap_err();
        assert_eq!(err.action, FsAction::WriteFile);
        assert_eq!(err.data, "/missing/a.txt");
        assert_eq!(err.source.kind(), io::ErrorKind::NotFound);
        assert!(err.to_string().contains("write_file"));
    }

    #[test]
    fn errors_can_be_reported() {
        let reported = Rc::new(Cell::new(0));
        let count = reported.clone();
        let fs = ReactiveFs::with_policy(
            MemoryFs::new(),
            ErrorPolicy::report(move |err| {
                assert_eq!(err.action, FsAction::Rename);
                count.set(count.get() + 1);
            }),
        );

        assert!(fs.rename("/nope", "/still-nope").is_ok());
        assert_eq!(reported.get(), 1);
    }
}
