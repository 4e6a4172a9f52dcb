use crate::trace::RawHeader;

/// A header with text name and value, original casing preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub value: String,
}

impl HeaderField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// First value of `name`, compared case-insensitively.
pub fn find_header<'a>(headers: &'a [HeaderField], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// All values of `name` in order, compared case-insensitively.
pub fn header_values<'a>(
    headers: &'a [HeaderField],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// Comma-separated tokens across every occurrence of `name`.
pub fn header_tokens(headers: &[HeaderField], name: &str) -> Vec<String> {
    header_values(headers, name)
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Convert raw headers to text. Returns the names of headers that were not
/// valid UTF-8 and had to be converted lossily.
pub fn decode_headers(raw: &[RawHeader]) -> (Vec<HeaderField>, Vec<String>) {
    let mut lossy = Vec::new();
    let headers = raw
        .iter()
        .map(|header| {
            let name = String::from_utf8_lossy(&header.name).into_owned();
            let valid = std::str::from_utf8(&header.name).is_ok()
                && std::str::from_utf8(&header.value).is_ok();
            if !valid {
                lossy.push(name.clone());
            }
            let value = String::from_utf8_lossy(&header.value).into_owned();
            HeaderField { name, value }
        })
        .collect();
    (headers, lossy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_ignores_case() {
        let headers = vec![HeaderField::new("Content-Type", "text/html")];
        assert_eq!(find_header(&headers, "content-type"), Some("text/html"));
        assert_eq!(find_header(&headers, "CONTENT-TYPE"), Some("text/html"));
        assert_eq!(find_header(&headers, "content-length"), None);
    }

    #[test]
    fn test_tokens_across_repeated_headers() {
        let headers = vec![
            HeaderField::new("Transfer-Encoding", "gzip"),
            HeaderField::new("transfer-encoding", " chunked "),
        ];
        assert_eq!(
            header_tokens(&headers, "Transfer-Encoding"),
            vec!["gzip", "chunked"]
        );
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let raw = vec![
            RawHeader::new("X-Good", "fine"),
            RawHeader::new("X-Bad", b"caf\xe9".to_vec()),
        ];
        let (headers, lossy) = decode_headers(&raw);
        assert_eq!(headers[1].value, "caf\u{fffd}");
        assert_eq!(lossy, vec!["X-Bad"]);
    }
}
