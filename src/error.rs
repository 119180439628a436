//! Error types for framewire

use std::fmt;

/// Result type alias for framewire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for framewire
#[derive(Debug)]
pub enum Error {
    /// Incoming value-array count does not match the established field count
    ValueCountMismatch { expected: usize, got: usize },
    /// Invalid or missing schema
    InvalidSchema(String),
    /// Serialization errors
    Serialization(String),
    /// Channel stream has completed and accepts no further views
    ChannelClosed(String),
    /// Transport-level error surfaced by the upstream connection
    Transport(String),
    /// Configuration errors
    Config(String),
    /// Internal error
    Internal(String),
}

impl std::error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ValueCountMismatch { expected, got } => {
                write!(f, "value count mismatch: expected {}, got {}", expected, got)
            }
            Error::InvalidSchema(msg) => write!(f, "invalid schema: {}", msg),
            Error::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Error::ChannelClosed(channel) => write!(f, "channel closed: {}", channel),
            Error::Transport(msg) => write!(f, "transport error: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
