//! RFC 5322 header block handling: byte decoding, folding, and the two
//! values the cross-reference needs (the `From ` separator token and the
//! `Message-ID`).

use once_cell::sync::Lazy;
use regex::Regex;

use crate::parser::mbox::strip_bom;

/// Container-relative identifier written by the exporter into each `From `
/// separator line, e.g. `12-0f8fad5b-d9cb-469f-a165-70867728950e.mbox`.
static FROM_ID_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[0-9]+-[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}\.mbox")
        .expect("valid from-id pattern")
});

/// Decode raw header bytes to a string.
///
/// Tries UTF-8 first, then falls back to Windows-1252 (which accepts every byte).
pub fn decode_header_bytes(bytes: &[u8]) -> String {
    let bytes = strip_bom(bytes);
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
            decoded.into_owned()
        }
    }
}

/// Unfold headers: join continuation lines (starting with space or tab) with the previous header.
///
/// Returns a list of `(lowercase_name, raw_value)` pairs.
pub fn unfold_headers(text: &str) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();

    for line in text.lines() {
        if line.starts_with(' ') || line.starts_with('\t') {
            // Continuation line
            if let Some(last) = result.last_mut() {
                if !last.1.is_empty() {
                    last.1.push(' ');
                }
                last.1.push_str(line.trim());
            }
        } else if line.starts_with("From ") {
            // The separator line is not a header even if it contains a colon
            continue;
        } else if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_lowercase();
            let value = line[colon_pos + 1..].trim().to_string();
            result.push((name, value));
        }
        // Lines without a colon and not a continuation are silently skipped
    }

    result
}

/// Get the first value for a header name (case-insensitive).
pub fn get_header(headers: &[(String, String)], name: &str) -> Option<String> {
    headers
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
}

/// Normalize a Message-ID for use as a lookup key.
///
/// Whitespace is trimmed and one pair of surrounding angle brackets removed,
/// so `<abc@x>` and `abc@x` compare equal.
pub fn normalize_message_id(raw: &str) -> String {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .unwrap_or(trimmed)
        .trim()
        .to_string()
}

/// Extract the container-relative identifier from a `From ` separator line.
///
/// Prefers the exporter's `<int>-<uuid>.mbox` token anywhere on the line and
/// falls back to the first whitespace-delimited token after `From `.
pub fn extract_from_id(separator_line: &str) -> Option<String> {
    let line = separator_line.trim_start_matches('\u{feff}');
    let rest = line.strip_prefix("From ")?;
    if let Some(m) = FROM_ID_TOKEN.find(rest) {
        return Some(m.as_str().to_string());
    }
    rest.split_whitespace().next().map(str::to_string)
}

/// Pull `(from_id, message_id)` out of one message's header block.
///
/// The block starts with the `From ` separator line, as produced by
/// [`crate::parser::mbox::scan_headers`]. Returns `None` when either value
/// is missing.
pub fn parse_xref_headers(raw_headers: &[u8]) -> Option<(String, String)> {
    let text = decode_header_bytes(raw_headers);
    let separator = text.lines().next()?;
    let from_id = extract_from_id(separator)?;

    let headers = unfold_headers(&text);
    let message_id = get_header(&headers, "message-id")
        .map(|v| normalize_message_id(&v))
        .filter(|v| !v.is_empty())?;

    Some((from_id, message_id))
}
