//! Store paths.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// One step into a store value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A key of an object.
    Key(String),
    /// An index of an array.
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        Self::Key(key.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        Self::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

/// A location inside a store value. The empty path is the root.
///
/// Paths parse from a dotted notation with bracketed indices:
///
/// ```rust
/// use filament_core::store::{Path, PathSegment};
///
/// let path = Path::parse("todos[2].title");
/// assert_eq!(path.segments(), &[
///     PathSegment::Key("todos".into()),
///     PathSegment::Index(2),
///     PathSegment::Key("title".into()),
/// ]);
/// assert_eq!(path.to_string(), "todos[2].title");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(SmallVec<[PathSegment; 4]>);

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse `a.b[0].c`. Empty input is the root.
    pub fn parse(input: &str) -> Self {
        let mut segments = SmallVec::new();
        for part in input.split('.').filter(|part| !part.is_empty()) {
            let (key, mut rest) = match part.find('[') {
                Some(at) => part.split_at(at),
                None => (part, ""),
            };
            if !key.is_empty() {
                segments.push(PathSegment::Key(key.to_owned()));
            }
            while let Some(open) = rest.strip_prefix('[') {
                let Some(close) = open.find(']') else {
                    // Unterminated bracket: keep the text as a key
                    segments.push(PathSegment::Key(rest.to_owned()));
                    break;
                };
                let inner = &open[..close];
                segments.push(match inner.parse::<usize>() {
                    Ok(index) => PathSegment::Index(index),
                    Err(_) => PathSegment::Key(inner.to_owned()),
                });
                rest = &open[close + 1..];
            }
        }
        Self(segments)
    }

    /// Extend with an object key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(PathSegment::Key(key.into()));
        self
    }

    /// Extend with an array index.
    pub fn index(mut self, index: usize) -> Self {
        self.0.push(PathSegment::Index(index));
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The path without its last segment, and that segment.
    pub fn split_last(&self) -> Option<(Path, &PathSegment)> {
        let (last, parent) = self.0.split_last()?;
        Some((Self(parent.iter().cloned().collect()), last))
    }

    /// Whether `self` equals `prefix` or lies below it.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub(crate) fn push(&mut self, segment: PathSegment) {
        self.0.push(segment);
    }

    pub(crate) fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            match segment {
                PathSegment::Key(key) if i > 0 => write!(f, ".{key}")?,
                segment => write!(f, "{segment}")?,
            }
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

impl<S: Into<PathSegment>, const N: usize> From<[S; N]> for Path {
    fn from(segments: [S; N]) -> Self {
        Self(segments.into_iter().map(Into::into).collect())
    }
}

impl FromIterator<PathSegment> for Path {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        for input in ["", "a", "a.b", "list[0]", "list[0][1].name", "[3].x"] {
            assert_eq!(Path::parse(input).to_string(), input);
        }
    }

    #[test]
    fn prefixes() {
        let parent = Path::parse("a.b");
        assert!(Path::parse("a.b[1].c").starts_with(&parent));
        assert!(parent.starts_with(&parent));
        assert!(!Path::parse("a.bc").starts_with(&parent));
        assert!(parent.starts_with(&Path::root()));
    }

    #[test]
    fn builders_match_parsing() {
        let built = Path::root().key("todos").index(1).key("done");
        assert_eq!(built, Path::parse("todos[1].done"));
        assert_eq!(Path::from(["todos"]), Path::parse("todos"));

        let (parent, last) = built.split_last().unwrap();
        assert_eq!(parent, Path::parse("todos[1]"));
        assert_eq!(last, &PathSegment::Key("done".into()));
    }

    #[test]
    fn serializes_as_a_plain_list() {
        let json = serde_json::to_string(&Path::parse("a[2]")).unwrap();
        assert_eq!(json, r#"["a",2]"#);
    }
}
