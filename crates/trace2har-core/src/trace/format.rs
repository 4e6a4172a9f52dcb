//! Container constants for session traces.
//!
//! A plain trace starts with `CHLS`, a little-endian `u16` version and a
//! `u16` flag word, followed by length-prefixed record frames. The archive
//! variant wraps a complete plain trace: `CHRZ`, one codec byte, then the
//! (possibly compressed) trace bytes.

use std::fmt;

pub const TRACE_MAGIC: [u8; 4] = *b"CHLS";
pub const ARCHIVE_MAGIC: [u8; 4] = *b"CHRZ";

/// Traces with a single cumulative elapsed time per record.
pub const VERSION_ELAPSED: u16 = 1;
/// Traces with per-phase timings.
pub const VERSION_PHASES: u16 = 2;

/// Flag bit: every record carries a timezone offset after its timestamp.
pub const FLAG_TZ_OFFSET: u16 = 0x0001;

/// Record kind byte for a request/response pair.
pub const KIND_TRANSACTION: u8 = 1;

/// Upper bound on a single record frame. Anything larger is treated as a
/// corrupt length prefix rather than an allocation request.
pub const MAX_FRAME_LEN: u32 = 1 << 30;

/// Compression codec of the archive variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveCodec {
    Stored,
    /// zlib-wrapped deflate
    Deflate,
    Gzip,
}

impl ArchiveCodec {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(ArchiveCodec::Stored),
            1 => Some(ArchiveCodec::Deflate),
            2 => Some(ArchiveCodec::Gzip),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ArchiveCodec::Stored => 0,
            ArchiveCodec::Deflate => 1,
            ArchiveCodec::Gzip => 2,
        }
    }
}

impl fmt::Display for ArchiveCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveCodec::Stored => write!(f, "stored"),
            ArchiveCodec::Deflate => write!(f, "deflate"),
            ArchiveCodec::Gzip => write!(f, "gzip"),
        }
    }
}

/// Parsed container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceHeader {
    pub version: u16,
    pub flags: u16,
    /// `None` for a plain trace.
    pub archive: Option<ArchiveCodec>,
}

impl TraceHeader {
    pub fn has_tz_offset(&self) -> bool {
        self.flags & FLAG_TZ_OFFSET != 0
    }

    pub fn is_supported_version(version: u16) -> bool {
        version == VERSION_ELAPSED || version == VERSION_PHASES
    }
}
