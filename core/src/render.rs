//! HTML output for the list column, the edit-screen field, the quick/bulk
//! edit field and the shortcode. Each context escapes differently.

use crate::note::{ItemId, NOTE_FIELD};

/// Request field carrying the edit token
pub const TOKEN_FIELD: &str = "spnotes_nonce";

/// Escapes text for HTML content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Inserts a `<br />` before every line break
pub fn nl2br(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' if chars.peek() == Some(&'\n') => {
                chars.next();
                out.push_str("<br />\r\n");
            }
            '\n' | '\r' => {
                out.push_str("<br />");
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Cell content of the note column. Empty notes produce no output at all.
pub fn render_column(item_id: ItemId, note: &str) -> String {
    if note.is_empty() {
        return String::new();
    }

    format!(
        "<div id=\"spnote-{}\">{}</div>",
        item_id,
        nl2br(&escape_html(note))
    )
}

/// Editable note field of the edit screen, always emitted
pub fn render_metabox_field(note: &str, placeholder: &str) -> String {
    format!(
        "<textarea style=\"display: block; width: 100%;\" rows=\"5\" name=\"{}\" placeholder=\"{}\">{}</textarea>",
        NOTE_FIELD,
        escape_html(placeholder),
        escape_html(note)
    )
}

/// Hidden input carrying an edit token
pub fn render_token_field(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\" />",
        TOKEN_FIELD,
        escape_html(token)
    )
}

/// Field added to the quick and bulk edit forms
pub fn render_quick_edit_field(label: &str, placeholder: &str, token: &str) -> String {
    let mut html = String::from("<fieldset class=\"inline-edit-col-right\">");
    html.push_str(&render_token_field(token));
    html.push_str("<div class=\"inline-edit-group\"><label>");
    html.push_str(&format!("<span class=\"title\">{}</span>", escape_html(label)));
    html.push_str(&format!(
        "<textarea name=\"{}\" placeholder=\"{}\"></textarea>",
        NOTE_FIELD,
        escape_html(placeholder)
    ));
    html.push_str("</label></div></fieldset>");
    html
}

/// Shortcode output. The note is trusted as stored (it was sanitized on
/// write), so only line breaks are converted. No item, no output.
pub fn render_shortcode(note: &str, item_id: Option<ItemId>) -> String {
    match item_id {
        Some(id) => format!(
            "<div class=\"simple-post-notes note note-{}\">{}</div>",
            id,
            nl2br(note)
        ),
        None => String::new(),
    }
}

/// An explicitly requested item wins over the one being displayed
pub fn resolve_shortcode_item(explicit: Option<ItemId>, ambient: Option<ItemId>) -> Option<ItemId> {
    explicit.or(ambient)
}

/// Attributes of a `[spnote ...]` shortcode
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShortcodeAttrs {
    pub id: Option<ItemId>,
}

impl ShortcodeAttrs {
    /// Parses `id="12"`, `id='12'` or `id=12`, optionally wrapped in
    /// `[spnote ...]`. An id that is not a positive integer counts as absent.
    pub fn parse(raw: &str) -> Self {
        let inner = raw
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .trim();
        let inner = inner.strip_prefix(NOTE_FIELD).unwrap_or(inner);

        let id = inner
            .split_whitespace()
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| key.eq_ignore_ascii_case("id"))
            .and_then(|(_, value)| value.trim_matches(|c: char| c == '"' || c == '\'').parse().ok());

        ShortcodeAttrs { id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u64) -> ItemId {
        ItemId::new(n).unwrap()
    }

    #[test]
    fn empty_column_renders_nothing() {
        assert_eq!(render_column(id(1), ""), "");
    }

    #[test]
    fn column_breaks_lines_and_escapes() {
        let html = render_column(id(7), "line1\nline2");
        assert_eq!(html, "<div id=\"spnote-7\">line1<br />\nline2</div>");

        let html = render_column(id(7), "a & \"b\"");
        assert!(html.contains("a &amp; &quot;b&quot;"));
    }

    #[test]
    fn metabox_field_always_rendered() {
        let html = render_metabox_field("", "Say \"hi\"");
        assert!(html.starts_with("<textarea"));
        assert!(html.contains("placeholder=\"Say &quot;hi&quot;\""));
        assert!(html.ends_with("></textarea>"));

        let html = render_metabox_field("x < y", "");
        assert!(html.contains(">x &lt; y</textarea>"));
    }

    #[test]
    fn quick_edit_field_carries_token_and_label() {
        let html = render_quick_edit_field("Notes", "hint", "abc123");
        assert!(html.contains("name=\"spnotes_nonce\" value=\"abc123\""));
        assert!(html.contains("<span class=\"title\">Notes</span>"));
        assert!(html.contains("name=\"spnote\" placeholder=\"hint\""));
    }

    #[test]
    fn shortcode_trusts_stored_text() {
        let html = render_shortcode("Tom & Jerry\nend", Some(id(3)));
        assert_eq!(
            html,
            "<div class=\"simple-post-notes note note-3\">Tom & Jerry<br />\nend</div>"
        );
        assert_eq!(render_shortcode("anything", None), "");
    }

    #[test]
    fn explicit_item_wins() {
        assert_eq!(resolve_shortcode_item(Some(id(2)), Some(id(9))), Some(id(2)));
        assert_eq!(resolve_shortcode_item(None, Some(id(9))), Some(id(9)));
        assert_eq!(resolve_shortcode_item(None, None), None);
    }

    #[test]
    fn parses_shortcode_attributes() {
        assert_eq!(ShortcodeAttrs::parse("[spnote id=\"12\"]").id, Some(id(12)));
        assert_eq!(ShortcodeAttrs::parse("id='4'").id, Some(id(4)));
        assert_eq!(ShortcodeAttrs::parse("ID=5").id, Some(id(5)));
        assert_eq!(ShortcodeAttrs::parse("[spnote]").id, None);
        assert_eq!(ShortcodeAttrs::parse("[spnote id=\"abc\"]").id, None);
        assert_eq!(ShortcodeAttrs::parse("[spnote id=0]").id, None);
    }

    #[test]
    fn nl2br_handles_crlf() {
        assert_eq!(nl2br("a\r\nb\rc"), "a<br />\r\nb<br />\rc");
    }
}
