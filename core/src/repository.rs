use std::cmp::Ordering;
use crate::error::{PostNotesError, Result};
use crate::note::{ItemId, Note, NOTE_META_KEY};
use crate::store::SharedStore;

/// Outcome of writing the same note to several items. Items are written
/// independently; a failure on one never rolls back the others.
#[derive(Debug, Default)]
pub struct SetManyResult {
    pub succeeded: Vec<ItemId>,
    pub failed: Vec<(ItemId, PostNotesError)>,
}

impl SetManyResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// IDs whose write failed
    pub fn failed_ids(&self) -> Vec<ItemId> {
        self.failed.iter().map(|(id, _)| *id).collect()
    }
}

/// Sort direction for the note column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    /// Parses a list-table `order` parameter; anything but `desc` sorts ascending
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.eq_ignore_ascii_case("desc") => SortOrder::Descending,
            _ => SortOrder::Ascending,
        }
    }
}

/// Reads and writes note text. The text passed to `set` is stored verbatim;
/// callers sanitize before writing.
#[derive(Clone)]
pub struct NoteRepository {
    store: SharedStore,
}

impl NoteRepository {
    pub fn new(store: SharedStore) -> Self {
        NoteRepository { store }
    }

    /// Returns the note text of an item, or an empty string when it has none
    pub fn get(&self, item_id: ItemId) -> Result<String> {
        Ok(self
            .store
            .get_meta(item_id, NOTE_META_KEY)?
            .unwrap_or_default())
    }

    /// Returns the note of an item as a [`Note`]
    pub fn note(&self, item_id: ItemId) -> Result<Note> {
        Ok(Note::new(item_id, self.get(item_id)?))
    }

    /// Stores the note text of an item, replacing what was there
    pub fn set(&self, item_id: ItemId, text: &str) -> Result<()> {
        self.store.set_meta(item_id, NOTE_META_KEY, text)?;
        tracing::debug!("Stored note for item {} ({} bytes)", item_id, text.len());
        Ok(())
    }

    /// Writes the same text to every item, continuing past failures
    pub fn set_many(&self, item_ids: &[ItemId], text: &str) -> SetManyResult {
        let mut result = SetManyResult::default();

        for &item_id in item_ids {
            match self.set(item_id, text) {
                Ok(()) => result.succeeded.push(item_id),
                Err(e) => {
                    tracing::warn!("Failed to store note for item {}: {}", item_id, e);
                    result.failed.push((item_id, e));
                }
            }
        }

        result
    }

    /// Orders items by their note text, ties broken by ID
    pub fn sort_by_note(&self, item_ids: &[ItemId], order: SortOrder) -> Result<Vec<ItemId>> {
        let mut keyed = item_ids
            .iter()
            .map(|&id| Ok((self.get(id)?, id)))
            .collect::<Result<Vec<_>>>()?;

        keyed.sort_by(|(a_text, a_id), (b_text, b_id)| {
            let by_text = match order {
                SortOrder::Ascending => a_text.cmp(b_text),
                SortOrder::Descending => b_text.cmp(a_text),
            };
            match by_text {
                Ordering::Equal => a_id.cmp(b_id),
                other => other,
            }
        });

        Ok(keyed.into_iter().map(|(_, id)| id).collect())
    }
}
