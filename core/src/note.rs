use serde::{Deserialize, Serialize};
use crate::error::{PostNotesError, Result};

/// Meta key holding the note text of a content item
pub const NOTE_META_KEY: &str = "_spnote";

/// Column key of the admin list table, also the request field carrying note text
pub const NOTE_FIELD: &str = "spnote";

/// Identifier of a content item (post ID). Zero is never a valid item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ItemId(u64);

impl ItemId {
    /// Creates a new ItemId, rejecting zero
    pub fn new(id: u64) -> Result<Self> {
        if id == 0 {
            Err(PostNotesError::InvalidItemId(id.to_string()))
        } else {
            Ok(ItemId(id))
        }
    }

    /// Gets the inner value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl TryFrom<u64> for ItemId {
    type Error = PostNotesError;

    fn try_from(value: u64) -> Result<Self> {
        ItemId::new(value)
    }
}

impl From<ItemId> for u64 {
    fn from(id: ItemId) -> u64 {
        id.0
    }
}

impl std::str::FromStr for ItemId {
    type Err = PostNotesError;

    fn from_str(s: &str) -> Result<Self> {
        let id = s
            .trim()
            .parse::<u64>()
            .map_err(|_| PostNotesError::InvalidItemId(s.to_string()))?;
        ItemId::new(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The note attached to one content item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub item_id: ItemId,
    /// Plain text, may span several lines, empty when nothing was written
    pub text: String,
}

impl Note {
    pub fn new(item_id: ItemId, text: String) -> Self {
        Note { item_id, text }
    }

    pub fn empty(item_id: ItemId) -> Self {
        Note {
            item_id,
            text: String::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}
