mod entry;
mod reader;
mod types;
mod writer;

pub use entry::{EntryOptions, build_entry};
pub use reader::HarReader;
pub use types::*;
pub use writer::HarWriter;
