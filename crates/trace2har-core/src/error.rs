use thiserror::Error;

/// Fatal conversion errors. Any of these aborts the pipeline and no output
/// file is produced.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unrecognized trace format: {0}")]
    Format(String),

    #[error("Unsupported archive compression codec: 0x{0:02x}")]
    UnsupportedCompression(u8),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize HAR: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid HAR structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Conversion cancelled")]
    Cancelled,
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
