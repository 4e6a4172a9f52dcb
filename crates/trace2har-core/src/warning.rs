use serde::Serialize;
use std::fmt;

/// Which half of a transaction a warning refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Request,
    Response,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Request => write!(f, "request"),
            Side::Response => write!(f, "response"),
        }
    }
}

/// Non-fatal problems found while converting. They degrade the output but
/// never drop a record that was read successfully.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConversionWarning {
    /// The trace ends in the middle of a record.
    TruncatedInput {
        records_parsed: usize,
        missing_bytes: Option<u64>,
    },
    /// A record frame was complete but its body could not be parsed.
    MalformedRecord { frame: usize, reason: String },
    /// A body could not be dechunked or decompressed; raw bytes were kept.
    Decoding {
        index: usize,
        side: Side,
        encoding: String,
        reason: String,
    },
    /// A header contained invalid UTF-8 and was converted lossily.
    LossyHeader {
        index: usize,
        side: Side,
        name: String,
    },
}

impl ConversionWarning {
    /// Index of the output entry the warning is attached to. Reader-level
    /// warnings have no entry.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            ConversionWarning::TruncatedInput { .. }
            | ConversionWarning::MalformedRecord { .. } => None,
            ConversionWarning::Decoding { index, .. }
            | ConversionWarning::LossyHeader { index, .. } => Some(*index),
        }
    }
}

impl fmt::Display for ConversionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversionWarning::TruncatedInput {
                records_parsed,
                missing_bytes,
            } => {
                write!(
                    f,
                    "input truncated after {} complete records",
                    records_parsed
                )?;
                if let Some(missing) = missing_bytes {
                    write!(f, " ({} bytes missing)", missing)?;
                }
                Ok(())
            }
            ConversionWarning::MalformedRecord { frame, reason } => {
                write!(f, "frame {} skipped: {}", frame, reason)
            }
            ConversionWarning::Decoding {
                index,
                side,
                encoding,
                reason,
            } => write!(
                f,
                "record {}: could not decode {} body ({}): {}",
                index, side, encoding, reason
            ),
            ConversionWarning::LossyHeader { index, side, name } => write!(
                f,
                "record {}: {} header '{}' is not valid UTF-8",
                index, side, name
            ),
        }
    }
}
