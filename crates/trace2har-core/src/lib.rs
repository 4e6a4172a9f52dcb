pub mod config;
pub mod convert;
pub mod error;
pub mod har;
pub mod normalize;
pub mod trace;
pub mod warning;

pub use config::ConvertConfig;
pub use convert::{CancellationToken, ConversionState, ConversionSummary, Converter, Outcome};
pub use error::{Error, Result};
pub use warning::ConversionWarning;
