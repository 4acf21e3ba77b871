//! Turns untrusted input into plain text.
//!
//! Every note is passed through [`sanitize`] before it is written, and the
//! label and placeholder settings are passed through it before they are
//! displayed. The output never contains markup or angle brackets, keeps its
//! line breaks, and is a fixed point: sanitizing it again changes nothing.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(?:#([0-9]{1,7})|#[xX]([0-9a-fA-F]{1,6})|([a-zA-Z][a-zA-Z0-9]{1,31}));")
        .expect("valid entity regex")
});

static SCRIPT_STYLE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>")
        .expect("valid script/style regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid tag regex"));

/// Sanitizes free text, preserving newlines.
pub fn sanitize(raw: &str) -> String {
    let mut current = raw.to_string();

    // Each pass only ever shortens the text or turns a '\r' into '\n',
    // so this reaches a fixed point.
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Sanitizes text meant for a single-line context (column header, field label).
/// Every whitespace run, newlines included, collapses to one space.
pub fn sanitize_line(raw: &str) -> String {
    sanitize(raw).split_whitespace().collect::<Vec<_>>().join(" ")
}

fn sanitize_pass(input: &str) -> String {
    let decoded = decode_entities(input);
    let stripped = strip_tags(&decoded);
    normalize_newlines(&stripped).trim().to_string()
}

/// Decodes named and numeric character references. Unknown or invalid
/// references are left as they are.
pub fn decode_entities(input: &str) -> String {
    if !input.contains('&') {
        return input.to_string();
    }

    ENTITY_RE
        .replace_all(input, |caps: &Captures| {
            let decoded = if let Some(dec) = caps.get(1) {
                dec.as_str().parse::<u32>().ok().and_then(code_point)
            } else if let Some(hex) = caps.get(2) {
                u32::from_str_radix(hex.as_str(), 16).ok().and_then(code_point)
            } else {
                caps.get(3).and_then(|name| named_entity(name.as_str()))
            };

            match decoded {
                Some(c) => c.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn code_point(value: u32) -> Option<char> {
    if value == 0 {
        return None;
    }
    char::from_u32(value)
}

fn named_entity(name: &str) -> Option<char> {
    let c = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "hellip" => '\u{2026}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "euro" => '\u{20ac}',
        _ => return None,
    };
    Some(c)
}

/// Removes script/style elements with their content, then every remaining
/// tag, then any stray angle bracket.
pub fn strip_tags(input: &str) -> String {
    if !input.contains('<') && !input.contains('>') {
        return input.to_string();
    }

    let without_blocks = SCRIPT_STYLE_RE.replace_all(input, "");
    let without_tags = TAG_RE.replace_all(&without_blocks, "");
    without_tags.chars().filter(|c| *c != '<' && *c != '>').collect()
}

fn normalize_newlines(input: &str) -> String {
    if !input.contains('\r') {
        return input.to_string();
    }
    input.replace("\r\n", "\n").replace('\r', "\n")
}
