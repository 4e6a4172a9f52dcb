mod body;
mod codec;
mod headers;
mod mime_type;
mod timing;

pub use body::{DecodeFailure, DecodedBody, decode_body, dechunk};
pub use codec::{CodecRegistry, ContentCodec};
pub use headers::{HeaderField, find_header, header_tokens, header_values};
pub use mime_type::{resolve_mime_type, sniff};
pub use timing::{CanonicalTimings, NOT_AVAILABLE};

use crate::config::DEFAULT_MAX_DECODED_SIZE;
use crate::trace::TransactionRecord;
use crate::warning::{ConversionWarning, Side};
use chrono::{DateTime, FixedOffset, Offset, Utc};

/// Settings shared by every record of a conversion. Immutable once built.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    codecs: CodecRegistry,
    max_decoded_size: usize,
}

impl NormalizerConfig {
    pub fn new(codecs: CodecRegistry) -> Self {
        Self {
            codecs,
            max_decoded_size: DEFAULT_MAX_DECODED_SIZE,
        }
    }

    /// Cap on a body's size after each decoding step.
    pub fn with_max_decoded_size(mut self, max_decoded_size: usize) -> Self {
        self.max_decoded_size = max_decoded_size;
        self
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    pub fn max_decoded_size(&self) -> usize {
        self.max_decoded_size
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self::new(CodecRegistry::default())
    }
}

/// A body with transfer/content codings removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalBody {
    /// Logical content, or the raw bytes when `decoding_failed` is set.
    pub content: Vec<u8>,
    /// Size of the body as recorded, before decoding.
    pub wire_size: usize,
    pub mime_type: String,
    /// Codings declared on the message, in the order they were applied.
    pub encodings: Vec<String>,
    pub decoding_failed: bool,
}

/// Encoding-resolved request/response pair consumed by the HAR encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTransaction {
    /// Position in the output, zero based.
    pub index: usize,
    pub started: DateTime<FixedOffset>,
    pub connection_id: u64,
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub request_headers: Vec<HeaderField>,
    pub request_body: Option<CanonicalBody>,
    pub status: u16,
    pub status_text: String,
    pub response_headers: Vec<HeaderField>,
    pub response_body: Option<CanonicalBody>,
    pub timings: CanonicalTimings,
    pub remote_address: Option<String>,
}

/// A normalized transaction plus whatever had to be degraded to produce it.
#[derive(Debug, Clone)]
pub struct Normalized {
    pub transaction: CanonicalTransaction,
    pub warnings: Vec<ConversionWarning>,
}

pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Convert one record. Never fails: anything that cannot be decoded is
    /// kept raw and reported as a warning.
    pub fn normalize(&self, index: usize, record: TransactionRecord) -> Normalized {
        let mut warnings = Vec::new();

        let (request_headers, lossy) = headers::decode_headers(&record.request_headers);
        warnings.extend(lossy.into_iter().map(|name| ConversionWarning::LossyHeader {
            index,
            side: Side::Request,
            name,
        }));
        let (response_headers, lossy) = headers::decode_headers(&record.response_headers);
        warnings.extend(lossy.into_iter().map(|name| ConversionWarning::LossyHeader {
            index,
            side: Side::Response,
            name,
        }));

        for warning in &warnings {
            tracing::warn!("{}", warning);
        }

        let request_body = record.request_body.as_deref().map(|raw| {
            self.normalize_body(index, Side::Request, raw, &request_headers, &mut warnings)
        });
        let response_body = record.response_body.as_deref().map(|raw| {
            self.normalize_body(index, Side::Response, raw, &response_headers, &mut warnings)
        });

        let transaction = CanonicalTransaction {
            index,
            started: started_at(record.started_ms, record.tz_offset_minutes),
            connection_id: record.connection_id,
            method: record.method,
            url: record.url,
            http_version: record.http_version,
            request_headers,
            request_body,
            status: record.status,
            status_text: record.status_text,
            response_headers,
            response_body,
            timings: CanonicalTimings::from_record(&record.timings),
            remote_address: record.remote_address,
        };

        Normalized {
            transaction,
            warnings,
        }
    }

    fn normalize_body(
        &self,
        index: usize,
        side: Side,
        raw: &[u8],
        headers: &[HeaderField],
        warnings: &mut Vec<ConversionWarning>,
    ) -> CanonicalBody {
        let decoded = decode_body(raw, headers, &self.config);

        if let Some(failure) = &decoded.failure {
            tracing::warn!(
                "Record {}: keeping raw {} body, {} decoding failed: {}",
                index,
                side,
                failure.encoding,
                failure.reason
            );
            warnings.push(ConversionWarning::Decoding {
                index,
                side,
                encoding: failure.encoding.clone(),
                reason: failure.reason.clone(),
            });
        }

        let mime_type = if decoded.failure.is_some() {
            // Sniffing compressed bytes would only ever say gzip.
            find_header(headers, "content-type")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string())
        } else {
            resolve_mime_type(headers, &decoded.bytes)
        };

        CanonicalBody {
            wire_size: raw.len(),
            mime_type,
            encodings: decoded.encodings,
            decoding_failed: decoded.failure.is_some(),
            content: decoded.bytes,
        }
    }
}

/// Trace timestamps without an offset are UTC.
fn started_at(millis: i64, tz_offset_minutes: Option<i16>) -> DateTime<FixedOffset> {
    let utc = DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or_else(|| {
        tracing::warn!("Timestamp {} ms is out of range, using the epoch", millis);
        DateTime::<Utc>::default()
    });
    let offset = tz_offset_minutes
        .and_then(|minutes| FixedOffset::east_opt(i32::from(minutes) * 60))
        .unwrap_or_else(|| Utc.fix());
    utc.with_timezone(&offset)
}
