pub mod format;
mod reader;
mod record;
mod writer;

pub use format::{ArchiveCodec, TraceHeader};
pub use reader::{RecordSource, TraceReader};
pub use record::{PhaseTimings, RawHeader, RecordTimings, TransactionRecord};
pub use writer::{ArchiveWriter, TraceOptions, TraceWriter};
