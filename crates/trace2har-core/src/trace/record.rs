/// Raw header as stored in the trace. Names and values are bytes because
/// the recording proxy does not guarantee UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawHeader {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl RawHeader {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Timing marks in microseconds. `None` means the phase was not measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhaseTimings {
    pub blocked: Option<u64>,
    pub dns: Option<u64>,
    pub connect: Option<u64>,
    pub ssl: Option<u64>,
    pub send: Option<u64>,
    pub wait: Option<u64>,
    pub receive: Option<u64>,
}

/// Timing information as recorded. Version 1 traces only carry the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTimings {
    Elapsed(Option<u64>),
    Phases(PhaseTimings),
}

impl Default for RecordTimings {
    fn default() -> Self {
        RecordTimings::Phases(PhaseTimings::default())
    }
}

/// One captured request/response pair, exactly as stored in the trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    /// Milliseconds since the Unix epoch.
    pub started_ms: i64,
    /// Offset east of UTC in minutes, when the trace records one.
    pub tz_offset_minutes: Option<i16>,
    pub connection_id: u64,
    pub method: String,
    pub url: String,
    pub http_version: String,
    pub request_headers: Vec<RawHeader>,
    pub request_body: Option<Vec<u8>>,
    pub status: u16,
    pub status_text: String,
    pub response_headers: Vec<RawHeader>,
    pub response_body: Option<Vec<u8>>,
    pub timings: RecordTimings,
    pub remote_address: Option<String>,
}

impl TransactionRecord {
    /// Minimal record, used as a starting point by builders and tests.
    pub fn new(method: impl Into<String>, url: impl Into<String>, status: u16) -> Self {
        Self {
            started_ms: 0,
            tz_offset_minutes: None,
            connection_id: 0,
            method: method.into(),
            url: url.into(),
            http_version: "HTTP/1.1".to_string(),
            request_headers: Vec::new(),
            request_body: None,
            status,
            status_text: String::new(),
            response_headers: Vec::new(),
            response_body: None,
            timings: RecordTimings::default(),
            remote_address: None,
        }
    }
}
