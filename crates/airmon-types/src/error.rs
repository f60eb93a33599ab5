//! Error types for data parsing in airmon-types.

use thiserror::Error;

/// Errors that can occur when parsing AirMonitor data.
///
/// Transport-specific errors (socket, remote store, database) belong in the
/// crates that own those transports.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A wire document could not be decoded.
    ///
    /// The raw payload is kept so callers can log exactly what the device sent.
    #[error("Malformed device payload: {source}")]
    Json {
        /// The payload as received.
        payload: String,
        /// The underlying decoder error.
        #[source]
        source: serde_json::Error,
    },

    /// A line was not valid UTF-8.
    #[error("Device payload is not valid UTF-8 ({len} bytes)")]
    InvalidUtf8 {
        /// The payload with invalid sequences replaced.
        payload: String,
        /// Length of the raw line in bytes.
        len: usize,
    },

    /// A line grew past the accepted length before its terminator arrived.
    #[error("Line exceeds limit of {limit} bytes")]
    LineTooLong {
        /// The configured limit.
        limit: usize,
    },

    /// Data was syntactically valid but semantically wrong.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Gas name not recognised.
    #[error("Unknown gas type: {0}")]
    UnknownGas(String),
}

impl ParseError {
    /// The original payload, when the error came from decoding one.
    pub fn payload(&self) -> Option<&str> {
        match self {
            ParseError::Json { payload, .. } | ParseError::InvalidUtf8 { payload, .. } => {
                Some(payload)
            }
            _ => None,
        }
    }
}

/// Result type alias using airmon-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
