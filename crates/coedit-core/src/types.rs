//! Core value types: identifiers, text ranges, versions, and chat users.
//!
//! These types are shared by the delta log, the remote cursor marker and the
//! tracker, and are all serde-compatible so they can travel over the channel.

use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Wall-clock milliseconds, assigned by whoever produced the event.
pub type Timestamp = u64;

/// Identifier of one shared buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditorId(pub u64);

impl fmt::Display for EditorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for EditorId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Identifier of one remote cursor (a peer may own several).
pub type CursorId = SmolStr;

/// A half-open character range in a buffer.
///
/// Offsets are Unicode scalar values (chars), not bytes. On the wire a range
/// is a two-element array `[start, end]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "[usize; 2]", into = "[usize; 2]")]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    /// Create a range, ordering the bounds if they arrive reversed.
    pub fn new(start: usize, end: usize) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    /// An empty range at `offset`.
    pub fn collapsed(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if an offset is within the range (end exclusive).
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.start && offset < self.end
    }

    /// Clip both bounds to a buffer of `len` chars.
    pub fn clamp(&self, len: usize) -> Self {
        Self::new(self.start.min(len), self.end.min(len))
    }

    pub fn to_range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<[usize; 2]> for TextRange {
    fn from([start, end]: [usize; 2]) -> Self {
        Self::new(start, end)
    }
}

impl From<TextRange> for [usize; 2] {
    fn from(range: TextRange) -> Self {
        [range.start, range.end]
    }
}

impl From<Range<usize>> for TextRange {
    fn from(range: Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Which version of the shared buffers is being shown.
///
/// `Current` is the live, editable state. `At(n)` is a read-only historical
/// snapshot. On the wire `Current` is the sentinel `-1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Version {
    #[default]
    Current,
    At(u64),
}

impl Version {
    pub fn is_current(&self) -> bool {
        matches!(self, Self::Current)
    }

    /// The historical version number, if any.
    pub fn number(&self) -> Option<u64> {
        match self {
            Self::Current => None,
            Self::At(n) => Some(*n),
        }
    }
}

impl From<i64> for Version {
    fn from(raw: i64) -> Self {
        if raw < 0 {
            Self::Current
        } else {
            Self::At(raw as u64)
        }
    }
}

impl From<Version> for i64 {
    fn from(version: Version) -> Self {
        match version {
            Version::Current => -1,
            Version::At(n) => n as i64,
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Current => f.write_str("current"),
            Self::At(n) => write!(f, "v{n}"),
        }
    }
}

/// A participant in the chat session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatUser {
    pub id: SmolStr,
    #[serde(default)]
    pub name: SmolStr,
    /// True for the user running this client.
    #[serde(default)]
    pub is_me: bool,
    /// Assigned colour (RGBA), filled in from the session palette.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
}

impl ChatUser {
    pub fn new(id: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_me: false,
            color: None,
        }
    }

    /// The local user.
    pub fn me(id: impl Into<SmolStr>, name: impl Into<SmolStr>) -> Self {
        Self {
            is_me: true,
            ..Self::new(id, name)
        }
    }
}

/// Role of the local participant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Editor,
    Observer,
}

/// Extra information passed along with a version switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VersionContext {
    pub role: Role,
}

impl VersionContext {
    pub fn new(role: Role) -> Self {
        Self { role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_orders_bounds() {
        let range = TextRange::new(10, 5);
        assert_eq!(range.start, 5);
        assert_eq!(range.end, 10);
        assert_eq!(range.len(), 5);
        assert_eq!(range.to_range(), 5..10);
    }

    #[test]
    fn test_range_contains() {
        let range = TextRange::new(5, 10);
        assert!(!range.contains(4));
        assert!(range.contains(5));
        assert!(range.contains(9));
        assert!(!range.contains(10)); // end is exclusive
    }

    #[test]
    fn test_range_clamp() {
        assert_eq!(TextRange::new(3, 9).clamp(5), TextRange::new(3, 5));
        assert_eq!(TextRange::new(7, 9).clamp(5), TextRange::collapsed(5));
    }

    #[test]
    fn test_range_wire_format() {
        let range: TextRange = serde_json::from_str("[0,5]").unwrap();
        assert_eq!(range, TextRange::new(0, 5));
        assert_eq!(serde_json::to_string(&range).unwrap(), "[0,5]");
    }

    #[test]
    fn test_version_sentinel() {
        let current: Version = serde_json::from_str("-1").unwrap();
        assert_eq!(current, Version::Current);
        let v: Version = serde_json::from_str("5").unwrap();
        assert_eq!(v, Version::At(5));
        assert_eq!(v.number(), Some(5));
        assert_eq!(serde_json::to_string(&Version::Current).unwrap(), "-1");
    }

    #[test]
    fn test_chat_user_defaults() {
        let user: ChatUser = serde_json::from_str(r#"{"id":"u1"}"#).unwrap();
        assert_eq!(user.id, "u1");
        assert!(!user.is_me);
        assert_eq!(user.color, None);
    }
}
