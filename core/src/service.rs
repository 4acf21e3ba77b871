//! Entry points the host calls: column, edit screen, quick edit, bulk edit
//! and shortcode. Settings are loaded by the caller once per request and
//! passed in.

use std::sync::Arc;
use crate::config::{content_type_choices, ConfigStore, ContentTypeChoice, Settings};
use crate::error::Result;
use crate::guard::{AccessGuard, TokenScope};
use crate::host::{Caller, ContentRegistry, RequestContext};
use crate::note::{ItemId, NOTE_FIELD};
use crate::render::{self, ShortcodeAttrs};
use crate::repository::{NoteRepository, SetManyResult};
use crate::request::{BulkEditSave, MetaboxSave, QuickEditSave};
use crate::sanitize::sanitize;
use crate::store::SharedStore;

/// Why a write request was accepted but nothing was written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Request came from an autosave
    Autosave,
    /// Request is not a quick-edit save
    NotQuickEdit,
    /// No content type has notes enabled
    NoEnabledTypes,
    /// Notes are not enabled for the item's content type
    TypeNotEnabled,
    /// No note field in the request
    MissingNote,
    /// Bulk edit without any item selected
    EmptySelection,
}

/// Result of a single-item save
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Skipped(SkipReason),
}

/// Result of a bulk save
#[derive(Debug)]
pub enum BulkOutcome {
    Applied(SetManyResult),
    Skipped(SkipReason),
}

/// The note feature, wired to its collaborators
pub struct NoteService {
    store: SharedStore,
    registry: Arc<dyn ContentRegistry>,
    repository: NoteRepository,
    secret: Vec<u8>,
}

impl NoteService {
    pub fn new(store: SharedStore, registry: Arc<dyn ContentRegistry>, secret: &[u8]) -> Self {
        NoteService {
            repository: NoteRepository::new(store.clone()),
            store,
            registry,
            secret: secret.to_vec(),
        }
    }

    /// A settings store for one request
    pub fn config(&self) -> ConfigStore {
        ConfigStore::new(self.store.clone())
    }

    pub fn repository(&self) -> &NoteRepository {
        &self.repository
    }

    /// A token guard bound to the caller's session
    pub fn guard(&self, caller: &Caller) -> Result<AccessGuard> {
        AccessGuard::for_caller(&self.secret, caller)
    }

    /// Issues a token the caller can present with a later save
    pub fn issue_token(&self, caller: &Caller, scope: &TokenScope) -> Result<String> {
        Ok(self.guard(caller)?.issue(scope))
    }

    /// Content types offered on the settings screen
    pub fn content_type_choices(&self, settings: &Settings) -> Vec<ContentTypeChoice> {
        content_type_choices(self.registry.as_ref(), settings)
    }

    /// Cell of the note column for one item
    pub fn render_column(&self, item_id: ItemId) -> Result<String> {
        let note = self.repository.get(item_id)?;
        Ok(render::render_column(item_id, &note))
    }

    /// Note box of the edit screen: the item's token, then the field if the
    /// caller may edit. Empty for types without notes.
    pub fn render_metabox(
        &self,
        settings: &Settings,
        caller: &Caller,
        item_id: ItemId,
        content_type: &str,
    ) -> Result<String> {
        if !settings.is_enabled(content_type) {
            return Ok(String::new());
        }

        let token = self.issue_token(caller, &TokenScope::Item(item_id))?;
        let mut html = render::render_token_field(&token);

        if !AccessGuard::can_edit(caller) {
            return Ok(html);
        }

        let note = self.repository.get(item_id)?;
        html.push_str(&render::render_metabox_field(
            &note,
            &settings.display_placeholder(),
        ));
        Ok(html)
    }

    /// Quick/bulk edit field; empty for other columns and for types without notes
    pub fn render_quick_edit_field(
        &self,
        settings: &Settings,
        caller: &Caller,
        column: &str,
        content_type: &str,
    ) -> Result<String> {
        if column != NOTE_FIELD || !settings.is_enabled(content_type) {
            return Ok(String::new());
        }

        let token = self.issue_token(caller, &TokenScope::Bulk)?;
        Ok(render::render_quick_edit_field(
            &settings.display_label(),
            &settings.display_placeholder(),
            &token,
        ))
    }

    /// Shortcode output for the explicitly given item, else the current one
    pub fn render_shortcode(&self, ctx: &RequestContext, attrs: &ShortcodeAttrs) -> Result<String> {
        let item_id = match render::resolve_shortcode_item(attrs.id, ctx.current_item) {
            Some(id) => id,
            None => return Ok(String::new()),
        };

        let note = self.repository.get(item_id)?;
        Ok(render::render_shortcode(&note, Some(item_id)))
    }

    /// Save from the edit screen
    pub fn save_metabox(
        &self,
        settings: &Settings,
        caller: &Caller,
        req: &MetaboxSave,
    ) -> Result<SaveOutcome> {
        self.guard(caller)?
            .authorize(&TokenScope::Item(req.item_id), req.token.as_deref(), caller)?;

        if !type_enabled(settings, req.content_type.as_deref()) {
            return Ok(skip(req.item_id, SkipReason::TypeNotEnabled));
        }

        let note = match &req.note {
            Some(note) => sanitize(note),
            None => return Ok(skip(req.item_id, SkipReason::MissingNote)),
        };

        self.repository.set(req.item_id, &note)?;
        tracing::info!("Saved note for item {}", req.item_id);
        Ok(SaveOutcome::Saved)
    }

    /// Save from a quick-edit row
    pub fn save_quick_edit(
        &self,
        settings: &Settings,
        caller: &Caller,
        req: &QuickEditSave,
    ) -> Result<SaveOutcome> {
        if req.autosave {
            return Ok(skip(req.item_id, SkipReason::Autosave));
        }
        if !req.is_quick_edit() {
            return Ok(skip(req.item_id, SkipReason::NotQuickEdit));
        }
        if settings.enabled_types.is_empty() {
            return Ok(skip(req.item_id, SkipReason::NoEnabledTypes));
        }

        self.guard(caller)?
            .authorize(&TokenScope::Bulk, req.token.as_deref(), caller)?;

        if !type_enabled(settings, req.content_type.as_deref()) {
            return Ok(skip(req.item_id, SkipReason::TypeNotEnabled));
        }

        let note = match &req.note {
            Some(note) => sanitize(note),
            None => return Ok(skip(req.item_id, SkipReason::MissingNote)),
        };

        self.repository.set(req.item_id, &note)?;
        tracing::info!("Saved quick-edit note for item {}", req.item_id);
        Ok(SaveOutcome::Saved)
    }

    /// Save from the bulk-edit form. Items are written one by one; the
    /// outcome lists which ones failed. The form does not always send the
    /// content type, so only a type that is sent is checked.
    pub fn save_bulk_edit(
        &self,
        settings: &Settings,
        caller: &Caller,
        req: &BulkEditSave,
    ) -> Result<BulkOutcome> {
        self.guard(caller)?
            .authorize(&TokenScope::Bulk, req.token.as_deref(), caller)?;

        if req.content_type.as_deref().map_or(false, |t| !settings.is_enabled(t)) {
            tracing::debug!("Skipped bulk edit: type not enabled");
            return Ok(BulkOutcome::Skipped(SkipReason::TypeNotEnabled));
        }

        let note = match req.note.as_deref() {
            Some(note) if !note.is_empty() => sanitize(note),
            _ => {
                tracing::debug!("Skipped bulk edit: no note given");
                return Ok(BulkOutcome::Skipped(SkipReason::MissingNote));
            }
        };

        if req.item_ids.is_empty() {
            tracing::debug!("Skipped bulk edit: no items selected");
            return Ok(BulkOutcome::Skipped(SkipReason::EmptySelection));
        }

        let result = self.repository.set_many(&req.item_ids, &note);
        tracing::info!(
            "Bulk edit stored note for {} item(s), {} failed",
            result.succeeded.len(),
            result.failed.len()
        );
        Ok(BulkOutcome::Applied(result))
    }
}

fn type_enabled(settings: &Settings, content_type: Option<&str>) -> bool {
    content_type.map_or(false, |t| settings.is_enabled(t))
}

fn skip(item_id: ItemId, reason: SkipReason) -> SaveOutcome {
    tracing::debug!("Skipped note save for item {}: {:?}", item_id, reason);
    SaveOutcome::Skipped(reason)
}
