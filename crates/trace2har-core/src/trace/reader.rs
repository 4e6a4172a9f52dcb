use super::format::{
    ARCHIVE_MAGIC, ArchiveCodec, KIND_TRANSACTION, MAX_FRAME_LEN, TRACE_MAGIC, TraceHeader,
    VERSION_ELAPSED,
};
use super::record::{PhaseTimings, RawHeader, RecordTimings, TransactionRecord};
use crate::warning::ConversionWarning;
use crate::{Error, Result};
use flate2::Crc;
use flate2::read::{GzDecoder, ZlibDecoder};
use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::rc::Rc;

/// Anything that yields transaction records in capture order.
///
/// The orchestrator only depends on this trait, so other trace layouts can
/// be plugged in without touching normalization or encoding.
pub trait RecordSource {
    /// Next complete record, or `Ok(None)` once the input is exhausted.
    fn next_record(&mut self) -> Result<Option<TransactionRecord>>;

    /// Warnings collected since the last call.
    fn take_warnings(&mut self) -> Vec<ConversionWarning>;
}

/// Single forward pass reader over a session trace or its archive variant.
pub struct TraceReader<'a> {
    input: Box<dyn Read + 'a>,
    header: TraceHeader,
    frames: usize,
    records: usize,
    finished: bool,
    warnings: Vec<ConversionWarning>,
    gzip: Option<Rc<RefCell<GzipCheck>>>,
}

impl TraceReader<'static> {
    /// Open a trace file, detecting the archive wrapper from its magic.
    pub fn open(path: &Path) -> Result<Self> {
        tracing::debug!("Opening trace file: {}", path.display());

        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<'a> TraceReader<'a> {
    /// Validate the container header and prepare to stream records.
    pub fn from_reader<R: Read + 'a>(input: R) -> Result<Self> {
        let mut input: Box<dyn Read + 'a> = Box::new(BufReader::new(input));

        let mut magic = [0u8; 4];
        read_header_bytes(&mut input, &mut magic)?;

        let mut archive = None;
        let mut gzip = None;
        if magic == ARCHIVE_MAGIC {
            let mut codec = [0u8; 1];
            read_header_bytes(&mut input, &mut codec)?;
            let codec =
                ArchiveCodec::from_byte(codec[0]).ok_or(Error::UnsupportedCompression(codec[0]))?;

            tracing::debug!("Trace is wrapped in a {} archive", codec);

            input = match codec {
                ArchiveCodec::Stored => input,
                ArchiveCodec::Deflate => Box::new(BufReader::new(ZlibDecoder::new(input))),
                ArchiveCodec::Gzip => {
                    let check = Rc::new(RefCell::new(GzipCheck::new()));
                    let raw = Tap::new(input, Rc::clone(&check), GzipCheck::observe_raw);
                    let decoded = Tap::new(
                        GzDecoder::new(raw),
                        Rc::clone(&check),
                        GzipCheck::observe_decoded,
                    );
                    gzip = Some(check);
                    Box::new(BufReader::new(decoded))
                }
            };
            archive = Some(codec);
            read_header_bytes(&mut input, &mut magic)?;
        }

        if magic != TRACE_MAGIC {
            return Err(Error::Format(format!(
                "bad magic {:02x?}, expected {:?}",
                magic,
                String::from_utf8_lossy(&TRACE_MAGIC)
            )));
        }

        let mut fixed = [0u8; 4];
        read_header_bytes(&mut input, &mut fixed)?;
        let version = u16::from_le_bytes([fixed[0], fixed[1]]);
        let flags = u16::from_le_bytes([fixed[2], fixed[3]]);

        if !TraceHeader::is_supported_version(version) {
            return Err(Error::Format(format!(
                "unsupported trace version {}",
                version
            )));
        }

        let header = TraceHeader {
            version,
            flags,
            archive,
        };
        tracing::debug!("Trace header: {:?}", header);

        Ok(Self {
            input,
            header,
            frames: 0,
            records: 0,
            finished: false,
            warnings: Vec::new(),
            gzip,
        })
    }

    pub fn header(&self) -> &TraceHeader {
        &self.header
    }

    /// Number of records returned so far.
    pub fn records_read(&self) -> usize {
        self.records
    }

    /// Read one length-prefixed frame. `None` at end of input, including a
    /// truncated trailing frame (which records a warning instead).
    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        let fill = read_up_to(&mut self.input, &mut len_buf)?;
        if fill.len == 0 && !fill.cut && self.archive_complete() {
            return Ok(None);
        }
        if fill.len < len_buf.len() {
            self.truncated(None);
            return Ok(None);
        }

        let len = u32::from_le_bytes(len_buf);
        if len > MAX_FRAME_LEN {
            return Err(Error::Format(format!(
                "frame {} declares {} bytes, exceeding the {} byte limit",
                self.frames, len, MAX_FRAME_LEN
            )));
        }

        let mut body = Vec::with_capacity(len.min(64 * 1024) as usize);
        let got = match (&mut self.input).take(u64::from(len)).read_to_end(&mut body) {
            Ok(got) => got,
            // Compressed archives cut off mid-stream surface as an EOF error.
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => body.len(),
            Err(e) => return Err(e.into()),
        };
        if got < len as usize {
            self.truncated(Some(u64::from(len) - got as u64));
            return Ok(None);
        }

        Ok(Some(body))
    }

    /// Whether the archive wrapper, if any, reached the end of its stream.
    /// A cut gzip member can end without an error, so its trailer is checked
    /// against what was actually decoded.
    fn archive_complete(&self) -> bool {
        match &self.gzip {
            Some(check) => {
                let complete = check.borrow().is_complete();
                if !complete {
                    tracing::debug!("Gzip trailer does not match the decoded stream");
                }
                complete
            }
            None => true,
        }
    }

    fn truncated(&mut self, missing_bytes: Option<u64>) {
        tracing::warn!(
            "Trace truncated after {} records (frame {})",
            self.records,
            self.frames
        );
        self.warnings.push(ConversionWarning::TruncatedInput {
            records_parsed: self.records,
            missing_bytes,
        });
        self.finished = true;
    }
}

impl RecordSource for TraceReader<'_> {
    fn next_record(&mut self) -> Result<Option<TransactionRecord>> {
        while !self.finished {
            let frame = match self.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    self.finished = true;
                    break;
                }
                Err(e) => {
                    self.finished = true;
                    return Err(e);
                }
            };

            let index = self.frames;
            self.frames += 1;

            match parse_frame(&frame, &self.header) {
                Ok(Some(record)) => {
                    self.records += 1;
                    tracing::trace!("Frame {}: {} {}", index, record.method, record.url);
                    return Ok(Some(record));
                }
                Ok(None) => {
                    tracing::debug!("Frame {}: skipping non-transaction record", index);
                }
                Err(reason) => {
                    tracing::warn!("Frame {} is malformed: {}", index, reason);
                    self.warnings.push(ConversionWarning::MalformedRecord {
                        frame: index,
                        reason,
                    });
                }
            }
        }

        Ok(None)
    }

    fn take_warnings(&mut self) -> Vec<ConversionWarning> {
        std::mem::take(&mut self.warnings)
    }
}

impl Iterator for TraceReader<'_> {
    type Item = Result<TransactionRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Header bytes must be present in full; anything shorter is not a trace.
fn read_header_bytes(input: &mut impl Read, buf: &mut [u8]) -> Result<()> {
    let fill = read_up_to(input, buf)?;
    if fill.len < buf.len() {
        return Err(Error::Format(format!(
            "input ends inside the container header ({} of {} bytes)",
            fill.len,
            buf.len()
        )));
    }
    Ok(())
}

/// Fill `buf` as far as the input allows and return how much was read.
fn read_up_to(input: &mut impl Read, buf: &mut [u8]) -> io::Result<Fill> {
    let mut fill = Fill { len: 0, cut: false };
    while fill.len < buf.len() {
        match input.read(&mut buf[fill.len..]) {
            Ok(0) => break,
            Ok(n) => fill.len += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                fill.cut = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(fill)
}

/// Bytes gathered by `read_up_to`. `cut` is set when a decoder reported its
/// stream ending early rather than reaching a clean end.
struct Fill {
    len: usize,
    cut: bool,
}

/// Running state for verifying a gzip member's trailer: the CRC-32 and size
/// of the decoded bytes against the last eight raw bytes seen.
struct GzipCheck {
    crc: Crc,
    tail: Vec<u8>,
}

impl GzipCheck {
    const TRAILER_LEN: usize = 8;

    fn new() -> Self {
        Self {
            crc: Crc::new(),
            tail: Vec::with_capacity(Self::TRAILER_LEN * 2),
        }
    }

    fn observe_raw(&mut self, bytes: &[u8]) {
        let start = bytes.len().saturating_sub(Self::TRAILER_LEN);
        self.tail.extend_from_slice(&bytes[start..]);
        let excess = self.tail.len().saturating_sub(Self::TRAILER_LEN);
        self.tail.drain(..excess);
    }

    fn observe_decoded(&mut self, bytes: &[u8]) {
        self.crc.update(bytes);
    }

    fn is_complete(&self) -> bool {
        self.tail.len() == Self::TRAILER_LEN
            && self.tail[..4] == self.crc.sum().to_le_bytes()
            && self.tail[4..] == self.crc.amount().to_le_bytes()
    }
}

/// Passes reads through, handing every chunk to a `GzipCheck` hook.
struct Tap<R> {
    inner: R,
    check: Rc<RefCell<GzipCheck>>,
    observe: fn(&mut GzipCheck, &[u8]),
}

impl<R: Read> Tap<R> {
    fn new(
        inner: R,
        check: Rc<RefCell<GzipCheck>>,
        observe: fn(&mut GzipCheck, &[u8]),
    ) -> Self {
        Self {
            inner,
            check,
            observe,
        }
    }
}

impl<R: Read> Read for Tap<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        (self.observe)(&mut self.check.borrow_mut(), &buf[..n]);
        Ok(n)
    }
}

/// Decode one frame body. `Ok(None)` for record kinds we do not convert.
fn parse_frame(
    frame: &[u8],
    header: &TraceHeader,
) -> std::result::Result<Option<TransactionRecord>, String> {
    let mut fields = Fields::new(frame);

    let kind = fields.u8("record kind")?;
    if kind != KIND_TRANSACTION {
        return Ok(None);
    }

    let started_ms = fields.i64("timestamp")?;
    let tz_offset_minutes = if header.has_tz_offset() {
        Some(fields.i16("timezone offset")?)
    } else {
        None
    };
    let connection_id = fields.u64("connection id")?;
    let method = fields.str16("method")?;
    let url = fields.str32("url")?;
    let http_version = fields.str16("http version")?;
    let request_headers = fields.headers("request headers")?;
    let request_body = fields.blob("request body")?;
    let status = fields.u16("status")?;
    let status_text = fields.str16("status text")?;
    let response_headers = fields.headers("response headers")?;
    let response_body = fields.blob("response body")?;

    let timings = if header.version == VERSION_ELAPSED {
        RecordTimings::Elapsed(micros(fields.i64("elapsed")?))
    } else {
        RecordTimings::Phases(PhaseTimings {
            blocked: micros(fields.i64("blocked timing")?),
            dns: micros(fields.i64("dns timing")?),
            connect: micros(fields.i64("connect timing")?),
            ssl: micros(fields.i64("ssl timing")?),
            send: micros(fields.i64("send timing")?),
            wait: micros(fields.i64("wait timing")?),
            receive: micros(fields.i64("receive timing")?),
        })
    };

    let remote_address = Some(fields.str16("remote address")?).filter(|s| !s.is_empty());

    if fields.remaining() > 0 {
        tracing::trace!("Ignoring {} trailing bytes in frame", fields.remaining());
    }

    Ok(Some(TransactionRecord {
        started_ms,
        tz_offset_minutes,
        connection_id,
        method,
        url,
        http_version,
        request_headers,
        request_body,
        status,
        status_text,
        response_headers,
        response_body,
        timings,
        remote_address,
    }))
}

fn micros(raw: i64) -> Option<u64> {
    u64::try_from(raw).ok()
}

/// Bounds-checked little-endian field cursor over one frame body.
struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Fields<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &str) -> std::result::Result<&'a [u8], String> {
        if self.remaining() < n {
            return Err(format!(
                "{} needs {} bytes at offset {}, only {} left",
                what,
                n,
                self.pos,
                self.remaining()
            ));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> std::result::Result<[u8; N], String> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> std::result::Result<u8, String> {
        Ok(self.array::<1>(what)?[0])
    }

    fn u16(&mut self, what: &str) -> std::result::Result<u16, String> {
        Ok(u16::from_le_bytes(self.array(what)?))
    }

    fn i16(&mut self, what: &str) -> std::result::Result<i16, String> {
        Ok(i16::from_le_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &str) -> std::result::Result<u32, String> {
        Ok(u32::from_le_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &str) -> std::result::Result<u64, String> {
        Ok(u64::from_le_bytes(self.array(what)?))
    }

    fn i64(&mut self, what: &str) -> std::result::Result<i64, String> {
        Ok(i64::from_le_bytes(self.array(what)?))
    }

    fn bytes16(&mut self, what: &str) -> std::result::Result<&'a [u8], String> {
        let len = self.u16(what)? as usize;
        self.take(len, what)
    }

    fn bytes32(&mut self, what: &str) -> std::result::Result<&'a [u8], String> {
        let len = self.u32(what)? as usize;
        self.take(len, what)
    }

    fn str16(&mut self, what: &str) -> std::result::Result<String, String> {
        Ok(String::from_utf8_lossy(self.bytes16(what)?).into_owned())
    }

    fn str32(&mut self, what: &str) -> std::result::Result<String, String> {
        Ok(String::from_utf8_lossy(self.bytes32(what)?).into_owned())
    }

    fn blob(&mut self, what: &str) -> std::result::Result<Option<Vec<u8>>, String> {
        let bytes = self.bytes32(what)?;
        Ok(if bytes.is_empty() {
            None
        } else {
            Some(bytes.to_vec())
        })
    }

    fn headers(&mut self, what: &str) -> std::result::Result<Vec<RawHeader>, String> {
        let count = self.u16(what)?;
        let mut headers = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = self.bytes16(what)?.to_vec();
            let value = self.bytes32(what)?.to_vec();
            headers.push(RawHeader { name, value });
        }
        Ok(headers)
    }
}
