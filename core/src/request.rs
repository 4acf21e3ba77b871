//! Typed requests for the write entry points, parsed from the untyped
//! key/value parameters the host forwards.

use serde_json::{Map, Value};
use crate::note::{ItemId, NOTE_FIELD};
use crate::render::TOKEN_FIELD;

/// Request parameters as received from the host
pub type RequestParams = Map<String, Value>;

/// Action value sent by the quick-edit form
pub const QUICK_EDIT_ACTION: &str = "inline-save";

const CONTENT_TYPE_FIELD: &str = "post_type";
const ACTION_FIELD: &str = "action";
const AUTOSAVE_FIELD: &str = "doing_autosave";
const BULK_TOKEN_FIELD: &str = "nonce";
const BULK_IDS_FIELD: &str = "post_ids";

/// Save from the edit screen of one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaboxSave {
    pub item_id: ItemId,
    pub content_type: Option<String>,
    pub note: Option<String>,
    pub token: Option<String>,
}

impl MetaboxSave {
    pub fn from_params(item_id: ItemId, params: &RequestParams) -> Self {
        MetaboxSave {
            item_id,
            content_type: param_string(params, CONTENT_TYPE_FIELD),
            note: param_string(params, NOTE_FIELD),
            token: param_string(params, TOKEN_FIELD),
        }
    }
}

/// Save from the quick-edit row of the list screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuickEditSave {
    pub item_id: ItemId,
    pub content_type: Option<String>,
    pub action: Option<String>,
    pub autosave: bool,
    pub note: Option<String>,
    pub token: Option<String>,
}

impl QuickEditSave {
    pub fn from_params(item_id: ItemId, params: &RequestParams) -> Self {
        QuickEditSave {
            item_id,
            content_type: param_string(params, CONTENT_TYPE_FIELD),
            action: param_string(params, ACTION_FIELD),
            autosave: param_flag(params, AUTOSAVE_FIELD),
            note: param_string(params, NOTE_FIELD),
            token: param_string(params, TOKEN_FIELD),
        }
    }

    pub fn is_quick_edit(&self) -> bool {
        self.action.as_deref() == Some(QUICK_EDIT_ACTION)
    }
}

/// Save from the bulk-edit form, one note for many items
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkEditSave {
    pub item_ids: Vec<ItemId>,
    pub content_type: Option<String>,
    pub note: Option<String>,
    pub token: Option<String>,
}

impl BulkEditSave {
    /// Item IDs that are not positive integers are dropped
    pub fn from_params(params: &RequestParams) -> Self {
        let item_ids = match params.get(BULK_IDS_FIELD) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| value_string(v).and_then(|s| s.parse().ok()))
                .collect(),
            _ => Vec::new(),
        };

        BulkEditSave {
            item_ids,
            content_type: param_string(params, CONTENT_TYPE_FIELD),
            note: param_string(params, NOTE_FIELD),
            token: param_string(params, BULK_TOKEN_FIELD),
        }
    }
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn param_string(params: &RequestParams, key: &str) -> Option<String> {
    params.get(key).and_then(value_string)
}

fn param_flag(params: &RequestParams, key: &str) -> bool {
    match params.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().map_or(false, |v| v != 0),
        Some(Value::String(s)) => matches!(s.as_str(), "1" | "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> RequestParams {
        match value {
            Value::Object(map) => map,
            _ => panic!("params must be an object"),
        }
    }

    fn id(n: u64) -> ItemId {
        ItemId::new(n).unwrap()
    }

    #[test]
    fn metabox_fields() {
        let req = MetaboxSave::from_params(
            id(4),
            &params(json!({"spnote": "hi", "spnotes_nonce": "tok", "post_type": "page"})),
        );
        assert_eq!(req.note.as_deref(), Some("hi"));
        assert_eq!(req.token.as_deref(), Some("tok"));
        assert_eq!(req.content_type.as_deref(), Some("page"));

        let req = MetaboxSave::from_params(id(4), &params(json!({})));
        assert_eq!(req.note, None);
        assert_eq!(req.token, None);
    }

    #[test]
    fn quick_edit_fields() {
        let req = QuickEditSave::from_params(
            id(8),
            &params(json!({
                "action": "inline-save",
                "post_type": "post",
                "doing_autosave": "1",
                "spnote": 12
            })),
        );
        assert!(req.is_quick_edit());
        assert!(req.autosave);
        assert_eq!(req.note.as_deref(), Some("12"));
    }

    #[test]
    fn bulk_ids_accept_numbers_and_strings() {
        let req = BulkEditSave::from_params(&params(json!({
            "post_ids": [1, "2", "x", 0, -5, null, " 3 "],
            "nonce": "tok",
            "spnote": "bulk note"
        })));
        assert_eq!(req.item_ids, vec![id(1), id(2), id(3)]);
        assert_eq!(req.token.as_deref(), Some("tok"));

        let req = BulkEditSave::from_params(&params(json!({"post_ids": "1,2"})));
        assert!(req.item_ids.is_empty());
    }
}
