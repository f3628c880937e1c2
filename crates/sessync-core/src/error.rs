use thiserror::Error;

/// Configuration-time and shared error type for sessync.
#[derive(Error, Debug)]
pub enum SessyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid extraction pattern `{pattern}`: {reason}")]
    ExtractionPatternInvalid { pattern: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<config::ConfigError> for SessyncError {
    fn from(e: config::ConfigError) -> Self {
        SessyncError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SessyncError>;
