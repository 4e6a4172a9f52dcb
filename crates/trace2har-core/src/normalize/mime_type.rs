use super::HeaderField;
use super::headers::find_header;

/// MIME type of a body: the `Content-Type` header when present, otherwise
/// sniffed from the leading bytes, otherwise `application/octet-stream`.
pub fn resolve_mime_type(headers: &[HeaderField], body: &[u8]) -> String {
    if let Some(value) = find_header(headers, "content-type").map(str::trim)
        && !value.is_empty()
    {
        if value.parse::<mime::Mime>().is_err() {
            tracing::debug!("Keeping unparseable Content-Type verbatim: {}", value);
        }
        return value.to_string();
    }

    sniff(body)
        .map(str::to_string)
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
}

const MAGIC: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "image/png"),
    (b"\xff\xd8\xff", "image/jpeg"),
    (b"GIF87a", "image/gif"),
    (b"GIF89a", "image/gif"),
    (b"%PDF-", "application/pdf"),
    (b"\x1f\x8b", "application/gzip"),
    (b"PK\x03\x04", "application/zip"),
    (b"\x00asm", "application/wasm"),
    (b"wOFF", "font/woff"),
    (b"wOF2", "font/woff2"),
];

/// Guess a MIME type from magic bytes and text heuristics.
pub fn sniff(body: &[u8]) -> Option<&'static str> {
    if body.is_empty() {
        return None;
    }

    for (prefix, mime_type) in MAGIC {
        if body.starts_with(prefix) {
            return Some(*mime_type);
        }
    }
    if body.len() >= 12 && &body[..4] == b"RIFF" && &body[8..12] == b"WEBP" {
        return Some("image/webp");
    }

    let text = std::str::from_utf8(body).ok()?;
    let text = text.trim_start_matches('\u{feff}').trim_start();
    let lower: String = text.chars().take(32).collect::<String>().to_ascii_lowercase();

    if lower.starts_with("<?xml") {
        return Some("text/xml");
    }
    if lower.starts_with("<!doctype html") || lower.starts_with("<html") {
        return Some("text/html");
    }
    if (text.starts_with('{') || text.starts_with('['))
        && serde_json::from_str::<serde::de::IgnoredAny>(text).is_ok()
    {
        return Some("application/json");
    }
    if text
        .chars()
        .all(|c| !c.is_control() || c.is_ascii_whitespace())
    {
        return Some("text/plain");
    }

    None
}
