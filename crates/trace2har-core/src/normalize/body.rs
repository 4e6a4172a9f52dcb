use super::{HeaderField, NormalizerConfig};
use super::headers::header_tokens;

/// Result of undoing transfer and content codings on a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedBody {
    pub bytes: Vec<u8>,
    /// Codings declared on the message, in the order they were applied.
    pub encodings: Vec<String>,
    /// Set when decoding stopped; `bytes` then holds the raw body.
    pub failure: Option<DecodeFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    pub encoding: String,
    pub reason: String,
}

/// Remove `Transfer-Encoding` framing, then `Content-Encoding`, last
/// applied first. Any failure, including output past the configured size
/// cap, returns the raw body untouched.
pub fn decode_body(
    raw: &[u8],
    headers: &[HeaderField],
    config: &NormalizerConfig,
) -> DecodedBody {
    let transfer = header_tokens(headers, "transfer-encoding");
    let content = header_tokens(headers, "content-encoding");

    let encodings: Vec<String> = content.iter().chain(transfer.iter()).cloned().collect();

    match undo_codings(raw, &transfer, &content, config) {
        Ok(bytes) => DecodedBody {
            bytes,
            encodings,
            failure: None,
        },
        Err(failure) => DecodedBody {
            bytes: raw.to_vec(),
            encodings,
            failure: Some(failure),
        },
    }
}

fn undo_codings(
    raw: &[u8],
    transfer: &[String],
    content: &[String],
    config: &NormalizerConfig,
) -> Result<Vec<u8>, DecodeFailure> {
    let mut bytes = raw.to_vec();

    // Transfer codings wrap the content codings, so they come off first.
    for coding in transfer.iter().rev() {
        bytes = if coding.eq_ignore_ascii_case("chunked") {
            dechunk(&bytes).map_err(|reason| DecodeFailure {
                encoding: coding.clone(),
                reason,
            })?
        } else {
            apply_codec(&bytes, coding, config)?
        };
    }

    for coding in content.iter().rev() {
        bytes = apply_codec(&bytes, coding, config)?;
    }

    Ok(bytes)
}

fn apply_codec(
    bytes: &[u8],
    coding: &str,
    config: &NormalizerConfig,
) -> Result<Vec<u8>, DecodeFailure> {
    let codec = config.codecs().get(coding).ok_or_else(|| DecodeFailure {
        encoding: coding.to_string(),
        reason: "unsupported coding".to_string(),
    })?;
    codec.decode(bytes, config.max_decoded_size()).map_err(|e| DecodeFailure {
        encoding: coding.to_string(),
        reason: e.to_string(),
    })
}

/// Strip HTTP/1.1 chunked framing. Chunk extensions and trailers are
/// discarded; bare LF line endings are accepted.
pub fn dechunk(data: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(data.len());
    let mut pos = 0;

    loop {
        let line_end = data[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| pos + i)
            .ok_or_else(|| format!("missing chunk size line at offset {}", pos))?;
        let line = &data[pos..line_end];
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let size_field = line.split(|&b| b == b';').next().unwrap_or_default();
        let size_text = std::str::from_utf8(size_field)
            .map_err(|_| format!("non-ASCII chunk size at offset {}", pos))?
            .trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| format!("invalid chunk size '{}' at offset {}", size_text, pos))?;
        pos = line_end + 1;

        if size == 0 {
            return Ok(out);
        }

        let end = pos
            .checked_add(size)
            .filter(|&end| end <= data.len())
            .ok_or_else(|| format!("chunk of {} bytes runs past end of body", size))?;
        out.extend_from_slice(&data[pos..end]);
        pos = end;

        if data[pos..].starts_with(b"\r\n") {
            pos += 2;
        } else if data[pos..].starts_with(b"\n") {
            pos += 1;
        } else {
            return Err(format!("missing CRLF after chunk at offset {}", pos));
        }
    }
}
