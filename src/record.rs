//! Identity keys for parent records.

use std::fmt::{self, Display, Formatter};

use crate::error::RegisterError;

/// The primary key of a record: a single value, or the ordered values of a
/// composite key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrimaryKey {
    Single(String),
    Composite(Vec<String>),
}

macro_rules! primary_key_from_int {
    ($($int:ty)*) => {$(
        impl From<$int> for PrimaryKey {
            fn from(value: $int) -> Self {
                PrimaryKey::Single(value.to_string())
            }
        }
    )*};
}

primary_key_from_int! { i32 i64 u32 u64 usize }

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::Single(value.to_owned())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        PrimaryKey::Single(value)
    }
}

impl From<Vec<String>> for PrimaryKey {
    fn from(values: Vec<String>) -> Self {
        PrimaryKey::Composite(values)
    }
}

/// A parent record that can be batched.
///
/// `concrete_type` is the runtime type tag used to split a batch into
/// concrete type groups. A polymorphic parent (typically an enum with one
/// variant per concrete type) reports the tag of the variant it holds.
pub trait Record {
    fn concrete_type(&self) -> &str;

    /// The record's primary key, or `None` if it doesn't have one yet.
    fn primary_key(&self) -> Option<PrimaryKey>;
}

/// The identity of a record within a batch: its concrete type plus its key
/// values. Two instances of the same logical record always have the same
/// `RecordKey`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    pub const SEPARATOR: char = ':';

    pub fn build<R: Record + ?Sized>(record: &R) -> Result<Self, RegisterError> {
        let concrete_type = record.concrete_type();
        let unidentified = || RegisterError::Unidentified {
            concrete_type: concrete_type.to_owned(),
        };

        let mut key = String::new();
        push_escaped(&mut key, concrete_type);

        match record.primary_key().ok_or_else(unidentified)? {
            PrimaryKey::Single(value) => {
                key.push(Self::SEPARATOR);
                push_escaped(&mut key, &value);
            }
            PrimaryKey::Composite(values) if values.is_empty() => return Err(unidentified()),
            PrimaryKey::Composite(values) => values.iter().for_each(|value| {
                key.push(Self::SEPARATOR);
                push_escaped(&mut key, value);
            }),
        }

        Ok(RecordKey(key))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Components are escaped so that a separator inside a value can't be
// mistaken for a component boundary.
fn push_escaped(key: &mut String, component: &str) {
    for c in component.chars() {
        if c == '\\' || c == RecordKey::SEPARATOR {
            key.push('\\');
        }
        key.push(c);
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
