//! Grouping keys derived from positions in the response tree.

use std::fmt::{self, Display, Formatter};
use std::iter::FromIterator;

/// One step of a response path: either a named field, or the index of an
/// element inside a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(name: &str) -> Self {
        PathSegment::Field(name.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(name: String) -> Self {
        PathSegment::Field(name)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// A grouping key for batched loads. Two response positions that differ only
/// by list indexes share a `PathKey`, which is what lets every element of a
/// list batch its relation loads together. Collapsing is driven purely by the
/// shape of the path: structurally identical subtrees under different
/// ancestors share a key.
///
/// Each field is written as the separator followed by the field name, with
/// the separator and `\` escaped, so `users.0.posts` derives `|users|posts`
/// and distinct field sequences never share a key. The empty key (produced
/// by the root path, or by a path made only of list indexes) is a valid,
/// distinct key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct PathKey(String);

impl PathKey {
    /// Precedes each field segment of a key.
    pub const SEPARATOR: char = '|';

    /// Derive the grouping key for a position in the response tree. List
    /// index segments are dropped; field segments are kept in order.
    pub fn derive(path: &[PathSegment]) -> Self {
        path.iter().cloned().collect()
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if this key has no field segments at all
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PathSegment> for PathKey {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(path: I) -> Self {
        let mut key = String::new();

        path.into_iter()
            .filter_map(|segment| match segment {
                PathSegment::Field(name) => Some(name),
                PathSegment::Index(..) => None,
            })
            .for_each(|name| {
                key.push(Self::SEPARATOR);
                for c in name.chars() {
                    if c == '\\' || c == Self::SEPARATOR {
                        key.push('\\');
                    }
                    key.push(c);
                }
            });

        PathKey(key)
    }
}

impl Display for PathKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PathKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
