//! Mapping from canonical transactions to HAR entries.

use super::types::{
    Cache, Content, Cookie, Entry, Header, Param, PostData, QueryParam, Request, Response, Timings,
};
use crate::config::DEFAULT_BODY_THRESHOLD;
use crate::normalize::{CanonicalBody, CanonicalTransaction, HeaderField, find_header, header_values};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat};
use url::Url;

/// Knobs that affect how entries are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryOptions {
    /// Bodies larger than this are always base64-encoded.
    pub body_threshold: usize,
}

impl Default for EntryOptions {
    fn default() -> Self {
        Self {
            body_threshold: DEFAULT_BODY_THRESHOLD,
        }
    }
}

pub fn build_entry(tx: &CanonicalTransaction, options: &EntryOptions) -> Entry {
    let total = tx.timings.total();

    Entry {
        page_ref: None,
        started_date_time: tx.started.to_rfc3339_opts(SecondsFormat::Millis, false),
        time: total.unwrap_or(0.0),
        time_unknown: total.is_none().then_some(true),
        request: build_request(tx, options),
        response: build_response(tx, options),
        cache: Cache::default(),
        timings: Timings {
            blocked: tx.timings.blocked,
            dns: tx.timings.dns,
            connect: tx.timings.connect,
            send: tx.timings.send,
            wait: tx.timings.wait,
            receive: tx.timings.receive,
            ssl: tx.timings.ssl,
            comment: None,
        },
        server_ip_address: tx.remote_address.clone(),
        connection: Some(tx.connection_id.to_string()),
        comment: None,
    }
}

fn build_request(tx: &CanonicalTransaction, options: &EntryOptions) -> Request {
    let parsed_url = Url::parse(&tx.url).ok();

    let query_string = parsed_url
        .as_ref()
        .map(|url| {
            url.query_pairs()
                .map(|(name, value)| QueryParam {
                    name: name.into_owned(),
                    value: value.into_owned(),
                    comment: None,
                })
                .collect()
        })
        .unwrap_or_default();

    let target = parsed_url
        .as_ref()
        .map(|url| match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        })
        .unwrap_or_else(|| tx.url.clone());
    let start_line = format!("{} {} {}", tx.method, target, tx.http_version);

    Request {
        method: tx.method.clone(),
        url: tx.url.clone(),
        http_version: tx.http_version.clone(),
        cookies: request_cookies(&tx.request_headers),
        headers: har_headers(&tx.request_headers),
        query_string,
        post_data: tx
            .request_body
            .as_ref()
            .map(|body| build_post_data(body, options)),
        headers_size: headers_size(&tx.http_version, &start_line, &tx.request_headers),
        body_size: tx.request_body.as_ref().map_or(0, |b| b.wire_size as i64),
        comment: None,
    }
}

fn build_response(tx: &CanonicalTransaction, options: &EntryOptions) -> Response {
    let start_line = format!("{} {} {}", tx.http_version, tx.status, tx.status_text);

    let content = match &tx.response_body {
        Some(body) => build_content(body, options),
        None => Content {
            size: 0,
            compression: None,
            mime_type: find_header(&tx.response_headers, "content-type")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
            text: None,
            encoding: None,
            decoding_failed: None,
            comment: None,
        },
    };

    Response {
        status: i64::from(tx.status),
        status_text: tx.status_text.clone(),
        http_version: tx.http_version.clone(),
        cookies: response_cookies(&tx.response_headers),
        headers: har_headers(&tx.response_headers),
        content,
        redirect_url: find_header(&tx.response_headers, "location")
            .unwrap_or_default()
            .to_string(),
        headers_size: headers_size(&tx.http_version, &start_line, &tx.response_headers),
        body_size: tx.response_body.as_ref().map_or(0, |b| b.wire_size as i64),
        comment: None,
    }
}

fn build_content(body: &CanonicalBody, options: &EntryOptions) -> Content {
    let size = body.content.len() as i64;
    let (text, encoding) = body_text(&body.content, options.body_threshold);

    let compression = if body.decoding_failed || body.encodings.is_empty() {
        None
    } else {
        Some(size - body.wire_size as i64).filter(|saved| *saved > 0)
    };

    Content {
        size,
        compression,
        mime_type: body.mime_type.clone(),
        text: Some(text),
        encoding,
        decoding_failed: body.decoding_failed.then_some(true),
        comment: encoding_comment(body),
    }
}

fn build_post_data(body: &CanonicalBody, options: &EntryOptions) -> PostData {
    let (text, encoding) = body_text(&body.content, options.body_threshold);

    let is_form = body
        .mime_type
        .parse::<mime::Mime>()
        .map(|m| m.essence_str() == mime::APPLICATION_WWW_FORM_URLENCODED.essence_str())
        .unwrap_or(false);
    let params = (is_form && encoding.is_none()).then(|| {
        url::form_urlencoded::parse(text.as_bytes())
            .map(|(name, value)| Param {
                name: name.into_owned(),
                value: Some(value.into_owned()),
                file_name: None,
                content_type: None,
                comment: None,
            })
            .collect()
    });

    PostData {
        mime_type: body.mime_type.clone(),
        params,
        text: Some(text),
        encoding,
        comment: encoding_comment(body),
    }
}

/// Literal text for small UTF-8 bodies, base64 for everything else.
fn body_text(bytes: &[u8], threshold: usize) -> (String, Option<String>) {
    if bytes.len() <= threshold
        && let Ok(text) = std::str::from_utf8(bytes)
    {
        return (text.to_string(), None);
    }
    (STANDARD.encode(bytes), Some("base64".to_string()))
}

fn encoding_comment(body: &CanonicalBody) -> Option<String> {
    if body.encodings.is_empty() {
        return None;
    }
    let encodings = body.encodings.join(", ");
    Some(if body.decoding_failed {
        format!("undecoded ({})", encodings)
    } else {
        format!("decoded from {}", encodings)
    })
}

fn har_headers(headers: &[HeaderField]) -> Vec<Header> {
    headers
        .iter()
        .map(|h| Header {
            name: h.name.clone(),
            value: h.value.clone(),
            comment: None,
        })
        .collect()
}

/// Size of the HTTP/1.x header block including the start line and the
/// blank line; `-1` for protocols without a textual header block.
fn headers_size(http_version: &str, start_line: &str, headers: &[HeaderField]) -> i64 {
    if !http_version.to_ascii_uppercase().starts_with("HTTP/1") {
        return -1;
    }
    let fields: usize = headers
        .iter()
        .map(|h| h.name.len() + 2 + h.value.len() + 2)
        .sum();
    (start_line.len() + 2 + fields + 2) as i64
}

fn request_cookies(headers: &[HeaderField]) -> Vec<Cookie> {
    header_values(headers, "cookie")
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let pair = pair.trim();
            if pair.is_empty() {
                return None;
            }
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Some(Cookie::new(name.trim(), value.trim()))
        })
        .collect()
}

/// Cookies set by the response. A later `Set-Cookie` for the same name
/// (compared case-insensitively) replaces the earlier one in place.
fn response_cookies(headers: &[HeaderField]) -> Vec<Cookie> {
    let mut cookies: Vec<Cookie> = Vec::new();

    for value in header_values(headers, "set-cookie") {
        let Some(cookie) = parse_set_cookie(value) else {
            continue;
        };
        match cookies
            .iter_mut()
            .find(|existing| existing.name.eq_ignore_ascii_case(&cookie.name))
        {
            Some(existing) => *existing = cookie,
            None => cookies.push(cookie),
        }
    }

    cookies
}

fn parse_set_cookie(value: &str) -> Option<Cookie> {
    let mut parts = value.split(';');
    let (name, cookie_value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie::new(name, cookie_value.trim());
    for attribute in parts {
        let attribute = attribute.trim();
        let (key, attr_value) = attribute.split_once('=').unwrap_or((attribute, ""));
        let attr_value = attr_value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "path" => cookie.path = Some(attr_value.to_string()),
            "domain" => cookie.domain = Some(attr_value.to_string()),
            "expires" => cookie.expires = Some(cookie_expiry(attr_value)),
            "httponly" => cookie.http_only = Some(true),
            "secure" => cookie.secure = Some(true),
            _ => {}
        }
    }
    Some(cookie)
}

/// HAR wants ISO 8601; cookie dates that do not parse are kept verbatim.
fn cookie_expiry(value: &str) -> String {
    DateTime::parse_from_rfc2822(value)
        .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, false))
        .unwrap_or_else(|_| value.to_string())
}
