use serde::{Deserialize, Serialize};
use crate::config::Settings;
use crate::note::{NOTE_FIELD, NOTE_META_KEY};

/// Column the note column is placed after
const ANCHOR_COLUMN: &str = "title";

/// One column of an admin list table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub key: String,
    pub header: String,
}

impl Column {
    pub fn new(key: &str, header: &str) -> Self {
        Column {
            key: key.to_string(),
            header: header.to_string(),
        }
    }
}

/// Host switches for the note column of one content type. The host can
/// turn the column wiring off entirely, or hide or unsort the column per type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnSwitches {
    /// Column wiring on for every type
    pub columns: bool,
    /// Column shown for this type
    pub display: bool,
    /// Column sortable for this type
    pub sortable: bool,
}

impl Default for ColumnSwitches {
    fn default() -> Self {
        ColumnSwitches {
            columns: true,
            display: true,
            sortable: true,
        }
    }
}

impl ColumnSwitches {
    pub fn shows_column(&self) -> bool {
        self.columns && self.display
    }

    pub fn sorts_column(&self) -> bool {
        self.columns && self.sortable
    }
}

/// Adds the note column right after the title column, or at the end when
/// the table has no title column. The header is the plain-text label.
/// Tables of types without notes, or with the column switched off, are left
/// as they are. Returns whether the column was added.
pub fn insert_note_column(
    columns: &mut Vec<Column>,
    settings: &Settings,
    content_type: &str,
    switches: &ColumnSwitches,
) -> bool {
    if !settings.is_enabled(content_type) || !switches.shows_column() {
        return false;
    }
    if columns.iter().any(|c| c.key == NOTE_FIELD) {
        return false;
    }

    let position = columns
        .iter()
        .position(|c| c.key == ANCHOR_COLUMN)
        .map(|i| i + 1)
        .unwrap_or(columns.len());

    columns.insert(position, Column::new(NOTE_FIELD, &settings.display_label()));
    true
}

/// Marks the note column as sortable. Entries map a column key to the
/// `orderby` value the host sends back.
pub fn register_sortable_column(
    sortable: &mut Vec<(String, String)>,
    settings: &Settings,
    content_type: &str,
    switches: &ColumnSwitches,
) {
    if !settings.is_enabled(content_type) || !switches.sorts_column() {
        return;
    }
    if !sortable.iter().any(|(key, _)| key == NOTE_FIELD) {
        sortable.push((NOTE_FIELD.to_string(), NOTE_FIELD.to_string()));
    }
}

/// How the host should order a list query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOrder {
    /// Order by the string value of a meta key
    MetaValue { meta_key: String },
}

/// Translates `orderby=spnote` into ordering by the note meta value.
/// Other values are left to the host.
pub fn query_order(orderby: &str) -> Option<QueryOrder> {
    if orderby == NOTE_FIELD {
        Some(QueryOrder::MetaValue {
            meta_key: NOTE_META_KEY.to_string(),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(columns: &[Column]) -> Vec<&str> {
        columns.iter().map(|c| c.key.as_str()).collect()
    }

    fn on() -> ColumnSwitches {
        ColumnSwitches::default()
    }

    #[test]
    fn inserted_after_title() {
        let mut columns = vec![
            Column::new("cb", ""),
            Column::new("title", "Title"),
            Column::new("author", "Author"),
            Column::new("date", "Date"),
        ];
        let mut settings = Settings::default();
        settings.label = "<b>Memo</b>".to_string();

        assert!(insert_note_column(&mut columns, &settings, "post", &on()));
        assert_eq!(keys(&columns), vec!["cb", "title", "spnote", "author", "date"]);
        assert_eq!(columns[2].header, "Memo");

        assert!(!insert_note_column(&mut columns, &settings, "post", &on()));
        assert_eq!(columns.len(), 5);
    }

    #[test]
    fn appended_without_title() {
        let mut columns = vec![Column::new("name", "Name")];
        insert_note_column(&mut columns, &Settings::default(), "page", &on());
        assert_eq!(keys(&columns), vec!["name", "spnote"]);
        assert_eq!(columns[1].header, "Notes");
    }

    #[test]
    fn disabled_type_keeps_table_unchanged() {
        let mut settings = Settings::default();
        settings.enabled_types = vec!["post".to_string()];

        let mut columns = vec![Column::new("title", "Title")];
        assert!(!insert_note_column(&mut columns, &settings, "page", &on()));
        assert_eq!(keys(&columns), vec!["title"]);

        let mut sortable = Vec::new();
        register_sortable_column(&mut sortable, &settings, "page", &on());
        assert!(sortable.is_empty());
    }

    #[test]
    fn switches_turn_off_display_and_sorting_separately() {
        let settings = Settings::default();
        let hidden = ColumnSwitches {
            display: false,
            ..ColumnSwitches::default()
        };

        let mut columns = vec![Column::new("title", "Title")];
        let mut sortable = Vec::new();
        insert_note_column(&mut columns, &settings, "post", &hidden);
        register_sortable_column(&mut sortable, &settings, "post", &hidden);
        assert_eq!(keys(&columns), vec!["title"]);
        assert_eq!(sortable.len(), 1);

        let unsorted = ColumnSwitches {
            sortable: false,
            ..ColumnSwitches::default()
        };
        let mut sortable = Vec::new();
        insert_note_column(&mut columns, &settings, "post", &unsorted);
        register_sortable_column(&mut sortable, &settings, "post", &unsorted);
        assert_eq!(keys(&columns), vec!["title", "spnote"]);
        assert!(sortable.is_empty());

        let off = ColumnSwitches {
            columns: false,
            ..ColumnSwitches::default()
        };
        let mut columns = vec![Column::new("title", "Title")];
        let mut sortable = Vec::new();
        insert_note_column(&mut columns, &settings, "post", &off);
        register_sortable_column(&mut sortable, &settings, "post", &off);
        assert_eq!(columns.len(), 1);
        assert!(sortable.is_empty());
    }

    #[test]
    fn switches_default_on_when_missing() {
        let switches: ColumnSwitches = serde_json::from_str(r#"{"sortable": false}"#).unwrap();
        assert!(switches.shows_column());
        assert!(!switches.sorts_column());
    }

    #[test]
    fn sortable_registered_once() {
        let mut sortable = vec![("title".to_string(), "title".to_string())];
        register_sortable_column(&mut sortable, &Settings::default(), "post", &on());
        register_sortable_column(&mut sortable, &Settings::default(), "post", &on());
        assert_eq!(sortable.len(), 2);
        assert_eq!(sortable[1], ("spnote".to_string(), "spnote".to_string()));
    }

    #[test]
    fn orderby_translation() {
        assert_eq!(
            query_order("spnote"),
            Some(QueryOrder::MetaValue {
                meta_key: "_spnote".to_string()
            })
        );
        assert_eq!(query_order("date"), None);
    }
}
