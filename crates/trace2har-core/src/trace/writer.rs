use super::format::{
    ARCHIVE_MAGIC, ArchiveCodec, FLAG_TZ_OFFSET, KIND_TRANSACTION, TRACE_MAGIC, TraceHeader,
    VERSION_ELAPSED, VERSION_PHASES,
};
use super::record::{PhaseTimings, RawHeader, RecordTimings, TransactionRecord};
use crate::{Error, Result};
use flate2::Compression;
use flate2::write::{GzEncoder, ZlibEncoder};
use std::io::{self, Write};

/// Container options for a new trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    pub version: u16,
    pub flags: u16,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            version: VERSION_PHASES,
            flags: 0,
        }
    }
}

/// Writes session traces in the layout `TraceReader` understands.
pub struct TraceWriter<W: Write> {
    out: W,
    options: TraceOptions,
}

impl<W: Write> TraceWriter<W> {
    pub fn new(mut out: W, options: TraceOptions) -> Result<Self> {
        if !TraceHeader::is_supported_version(options.version) {
            return Err(Error::Format(format!(
                "cannot write trace version {}",
                options.version
            )));
        }

        out.write_all(&TRACE_MAGIC)?;
        out.write_all(&options.version.to_le_bytes())?;
        out.write_all(&options.flags.to_le_bytes())?;

        Ok(Self { out, options })
    }

    pub fn write_record(&mut self, record: &TransactionRecord) -> Result<()> {
        let mut body = Vec::with_capacity(256);
        body.push(KIND_TRANSACTION);
        body.extend_from_slice(&record.started_ms.to_le_bytes());
        if self.options.flags & FLAG_TZ_OFFSET != 0 {
            body.extend_from_slice(&record.tz_offset_minutes.unwrap_or(0).to_le_bytes());
        }
        body.extend_from_slice(&record.connection_id.to_le_bytes());
        put_str16(&mut body, record.method.as_bytes())?;
        put_bytes32(&mut body, record.url.as_bytes())?;
        put_str16(&mut body, record.http_version.as_bytes())?;
        put_headers(&mut body, &record.request_headers)?;
        put_bytes32(&mut body, record.request_body.as_deref().unwrap_or_default())?;
        body.extend_from_slice(&record.status.to_le_bytes());
        put_str16(&mut body, record.status_text.as_bytes())?;
        put_headers(&mut body, &record.response_headers)?;
        put_bytes32(&mut body, record.response_body.as_deref().unwrap_or_default())?;

        match (self.options.version, record.timings) {
            (VERSION_ELAPSED, RecordTimings::Elapsed(elapsed)) => put_micros(&mut body, elapsed),
            (VERSION_ELAPSED, RecordTimings::Phases(phases)) => {
                put_micros(&mut body, total_micros(&phases))
            }
            (_, RecordTimings::Elapsed(elapsed)) => put_phases(
                &mut body,
                &PhaseTimings {
                    wait: elapsed,
                    ..PhaseTimings::default()
                },
            ),
            (_, RecordTimings::Phases(phases)) => put_phases(&mut body, &phases),
        }

        put_str16(
            &mut body,
            record.remote_address.as_deref().unwrap_or_default().as_bytes(),
        )?;

        let len = u32::try_from(body.len()).map_err(|_| too_long("record"))?;
        self.out.write_all(&len.to_le_bytes())?;
        self.out.write_all(&body)?;
        Ok(())
    }

    /// Flush and hand back the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Output side of the archive variant. Call [`ArchiveWriter::finish`] to
/// complete the compressed stream.
pub enum ArchiveWriter<W: Write> {
    Stored(W),
    Deflate(ZlibEncoder<W>),
    Gzip(GzEncoder<W>),
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(mut out: W, codec: ArchiveCodec) -> io::Result<Self> {
        out.write_all(&ARCHIVE_MAGIC)?;
        out.write_all(&[codec.as_byte()])?;

        Ok(match codec {
            ArchiveCodec::Stored => ArchiveWriter::Stored(out),
            ArchiveCodec::Deflate => {
                ArchiveWriter::Deflate(ZlibEncoder::new(out, Compression::default()))
            }
            ArchiveCodec::Gzip => ArchiveWriter::Gzip(GzEncoder::new(out, Compression::default())),
        })
    }

    pub fn finish(self) -> io::Result<W> {
        match self {
            ArchiveWriter::Stored(out) => Ok(out),
            ArchiveWriter::Deflate(encoder) => encoder.finish(),
            ArchiveWriter::Gzip(encoder) => encoder.finish(),
        }
    }
}

impl<W: Write> Write for ArchiveWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            ArchiveWriter::Stored(out) => out.write(buf),
            ArchiveWriter::Deflate(encoder) => encoder.write(buf),
            ArchiveWriter::Gzip(encoder) => encoder.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            ArchiveWriter::Stored(out) => out.flush(),
            ArchiveWriter::Deflate(encoder) => encoder.flush(),
            ArchiveWriter::Gzip(encoder) => encoder.flush(),
        }
    }
}

fn too_long(what: &str) -> Error {
    Error::Io(io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("{} is too long for the trace format", what),
    ))
}

fn put_str16(body: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u16::try_from(bytes.len()).map_err(|_| too_long("field"))?;
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(bytes);
    Ok(())
}

fn put_bytes32(body: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| too_long("field"))?;
    body.extend_from_slice(&len.to_le_bytes());
    body.extend_from_slice(bytes);
    Ok(())
}

fn put_headers(body: &mut Vec<u8>, headers: &[RawHeader]) -> Result<()> {
    let count = u16::try_from(headers.len()).map_err(|_| too_long("header list"))?;
    body.extend_from_slice(&count.to_le_bytes());
    for header in headers {
        put_str16(body, &header.name)?;
        put_bytes32(body, &header.value)?;
    }
    Ok(())
}

fn put_micros(body: &mut Vec<u8>, value: Option<u64>) {
    let raw = value.and_then(|v| i64::try_from(v).ok()).unwrap_or(-1);
    body.extend_from_slice(&raw.to_le_bytes());
}

fn put_phases(body: &mut Vec<u8>, phases: &PhaseTimings) {
    for value in [
        phases.blocked,
        phases.dns,
        phases.connect,
        phases.ssl,
        phases.send,
        phases.wait,
        phases.receive,
    ] {
        put_micros(body, value);
    }
}

fn total_micros(phases: &PhaseTimings) -> Option<u64> {
    [
        phases.blocked,
        phases.dns,
        phases.connect,
        phases.ssl,
        phases.send,
        phases.wait,
        phases.receive,
    ]
    .into_iter()
    .flatten()
    .reduce(u64::saturating_add)
}
