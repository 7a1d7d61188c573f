//! Cache key definitions.
//!
//! A [`CacheKey`] is an ordered list of string and number segments. The
//! serialized form tags every segment with its type and escapes separators, so
//! `["1", 2]`, `[1, 2]` and `["1:n2"]` all map to distinct strings.

use std::fmt;

use thiserror::Error;

const SEGMENT_SEPARATOR: char = ':';
const ESCAPE: char = '\\';
const STRING_TAG: char = 's';
const NUMBER_TAG: char = 'n';

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("cache key must contain at least one segment")]
    Empty,
    #[error("number segment {value} does not fit in i64")]
    NumberOutOfRange { value: u64 },
}

/// One component of a hierarchical cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeySegment {
    Str(String),
    Num(i64),
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        Self::Str(value.clone())
    }
}

macro_rules! number_segment {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for KeySegment {
                fn from(value: $ty) -> Self {
                    Self::Num(i64::from(value))
                }
            }
        )*
    };
}

number_segment!(i8, i16, i32, i64, u8, u16, u32);

// Wider unsigned values may not fit a number segment, so they only convert
// fallibly. `cache_key!` takes the infallible widths; pass counts as `u32` or
// convert with `KeySegment::try_from` first.
impl TryFrom<u64> for KeySegment {
    type Error = KeyError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self::Num)
            .map_err(|_| KeyError::NumberOutOfRange { value })
    }
}

impl TryFrom<usize> for KeySegment {
    type Error = KeyError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::try_from(value as u64)
    }
}

/// Structured identity of a cache entry, e.g. `["posts", "list", "v3", "all", 10, 0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    segments: Vec<KeySegment>,
}

impl CacheKey {
    /// Build a key from its segments. Empty keys are rejected.
    pub fn new(segments: Vec<KeySegment>) -> Result<Self, KeyError> {
        if segments.is_empty() {
            return Err(KeyError::Empty);
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.segments
    }

    /// Append a segment, returning the extended key.
    pub fn push(mut self, segment: impl Into<KeySegment>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Canonical string form used against the backend.
    pub fn serialize(&self) -> String {
        serialize_key(self)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&serialize_key(self))
    }
}

/// Build a [`CacheKey`] from a non-empty list of segment expressions.
///
/// ```
/// use quire::cache_key;
///
/// let key = cache_key!["posts", "list", "v3", 10, 0];
/// assert_eq!(key.segments().len(), 5);
/// ```
#[macro_export]
macro_rules! cache_key {
    ($first:expr $(, $rest:expr)* $(,)?) => {
        $crate::cache::CacheKey::from_first($first.into())
            $(.push($rest))*
    };
}

impl CacheKey {
    #[doc(hidden)]
    pub fn from_first(first: KeySegment) -> Self {
        Self {
            segments: vec![first],
        }
    }
}

/// Convert a key to its canonical string.
///
/// Each segment becomes `<tag><payload>`; string payloads escape `:` and `\`.
pub fn serialize_key(key: &CacheKey) -> String {
    let mut out = String::with_capacity(key.segments.len() * 8);
    for (index, segment) in key.segments.iter().enumerate() {
        if index > 0 {
            out.push(SEGMENT_SEPARATOR);
        }
        match segment {
            KeySegment::Str(value) => {
                out.push(STRING_TAG);
                for ch in value.chars() {
                    if ch == SEGMENT_SEPARATOR || ch == ESCAPE {
                        out.push(ESCAPE);
                    }
                    out.push(ch);
                }
            }
            KeySegment::Num(value) => {
                out.push(NUMBER_TAG);
                out.push_str(&value.to_string());
            }
        }
    }
    out
}
