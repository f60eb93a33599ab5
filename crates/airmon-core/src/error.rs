//! Error types for airmon-core.
//!
//! This module defines the errors raised while talking to a data source
//! (the ESP32 link or the simulator) and while validating pipeline options.
//! Remote-store failures have their own type, [`crate::remote::RemoteError`],
//! because callers handle them differently: they are recorded on the row
//! being synced rather than aborting the operation.
//!
//! # Recovery
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::Parse`] | Skip the frame; the payload is kept for logging |
//! | [`Error::Timeout`] | Try again on the next tick |
//! | [`Error::Io`] | Reconnect |
//! | [`Error::ConnectionClosed`] | Reconnect |
//! | [`Error::NotConnected`] | Connect first |
//! | [`Error::InvalidConfig`] | Fix configuration and restart |
//!
//! Nothing in this crate retries automatically.

use std::time::Duration;

use thiserror::Error;

use airmon_types::ParseError;

/// Errors that can occur when reading from or commanding an AirMonitor device.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A frame could not be decoded.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Operation attempted while not connected to a device.
    #[error("Not connected to device")]
    NotConnected,

    /// The device closed the stream.
    #[error("Connection to {peer} closed")]
    ConnectionClosed {
        /// Address or name of the peer.
        peer: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Failed to encode an outgoing document.
    #[error("Failed to encode command: {0}")]
    Encode(#[source] serde_json::Error),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection-closed error for `peer`.
    pub fn closed(peer: impl Into<String>) -> Self {
        Self::ConnectionClosed { peer: peer.into() }
    }

    /// True for errors that only affect a single frame.
    ///
    /// The link stays usable after these.
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Error::Parse(_))
    }
}

/// Result type alias using airmon-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::timeout("read_frame", Duration::from_secs(5));
        assert!(err.to_string().contains("read_frame"));
        assert!(err.to_string().contains("5s"));

        let err = Error::closed("192.168.4.1:8080");
        assert_eq!(err.to_string(), "Connection to 192.168.4.1:8080 closed");

        let err = Error::invalid_config("poll_interval must be > 0");
        assert!(err.to_string().contains("poll_interval"));
    }

    #[test]
    fn test_parse_error_is_transparent() {
        let err: Error = ParseError::InvalidData("bad level".to_string()).into();
        assert_eq!(err.to_string(), "Invalid data: bad level");
        assert!(err.is_frame_error());
        assert!(!Error::NotConnected.is_frame_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("pipe closed"));
    }
}
