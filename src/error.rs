use thiserror::Error;

/// All errors produced by the recorder pipeline.
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("storage full: {free_bytes} bytes free, {required_bytes} required")]
    StorageFull { free_bytes: u64, required_bytes: u64 },

    #[error("a recording session is already open")]
    SessionAlreadyOpen,

    #[error("no recording session is open")]
    NoActiveSession,

    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("unsupported container format {format_code} ({bits_per_sample}-bit)")]
    UnsupportedFormat {
        format_code: u16,
        bits_per_sample: u16,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RecorderError>;
