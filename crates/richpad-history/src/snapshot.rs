/// Value types describing a field's content and cursor at one instant.
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one independently tracked editable field.
///
/// Assigned by the host; the engine never generates or interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl From<&str> for FieldId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FieldId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selection snapshot captured alongside a content snapshot.
///
/// Offsets are char indices into the field content. A collapsed
/// selection (caret) has `anchor == focus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CursorSnapshot {
    pub anchor: usize,
    pub focus: usize,
}

impl CursorSnapshot {
    /// A caret at `offset`.
    pub fn collapsed(offset: usize) -> Self {
        Self {
            anchor: offset,
            focus: offset,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Opaque representation of a field's content at one instant.
///
/// Two snapshots are equal iff their content strings are equal. Cursor
/// state is captured separately and never takes part in equality.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    content: String,
}

impl Snapshot {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> String {
        self.content
    }
}

impl From<&str> for Snapshot {
    fn from(content: &str) -> Self {
        Self::new(content)
    }
}
