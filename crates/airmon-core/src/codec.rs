//! Encoding and decoding of the line-delimited JSON wire protocol.
//!
//! Each document occupies exactly one line. Decoding trims surrounding
//! whitespace (including the line terminator); encoding never emits a
//! newline inside a document.

use serde::Serialize;
use tracing::debug;

use airmon_types::{ControlCommand, ParseError, ParseResult, SensorData};

use crate::error::{Error, Result};

/// Decode one status frame.
///
/// On failure the returned error keeps the payload as received.
///
/// ```
/// use airmon_core::codec::decode_frame;
///
/// let err = decode_frame("{\"device\":").unwrap_err();
/// assert_eq!(err.payload(), Some("{\"device\":"));
/// ```
pub fn decode_frame(payload: &str) -> ParseResult<SensorData> {
    serde_json::from_str(payload.trim()).map_err(|source| {
        debug!("Rejected frame ({} bytes): {}", payload.len(), source);
        ParseError::Json {
            payload: payload.to_string(),
            source,
        }
    })
}

/// Decode one control command.
pub fn decode_command(payload: &str) -> ParseResult<ControlCommand> {
    serde_json::from_str(payload.trim()).map_err(|source| ParseError::Json {
        payload: payload.to_string(),
        source,
    })
}

/// Encode a control command as a compact single-line document.
pub fn encode_command(command: &ControlCommand) -> Result<String> {
    serde_json::to_string(command).map_err(Error::Encode)
}

/// Encode a status frame as a compact single-line document.
pub fn encode_frame(frame: &SensorData) -> Result<String> {
    serde_json::to_string(frame).map_err(Error::Encode)
}

/// Encode any document followed by `\n`, ready to write to a link.
pub fn encode_line<T: Serialize>(document: &T) -> Result<Vec<u8>> {
    let mut line = serde_json::to_vec(document).map_err(Error::Encode)?;
    line.push(b'\n');
    Ok(line)
}

/// True when `payload` is syntactically valid JSON of any shape.
pub fn is_valid_json(payload: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(payload).is_ok()
}

/// Re-indent a JSON document for display.
///
/// Invalid input is returned unchanged.
pub fn pretty_print(payload: &str) -> String {
    serde_json::from_str::<serde_json::Value>(payload)
        .and_then(|value| serde_json::to_string_pretty(&value))
        .unwrap_or_else(|_| payload.to_string())
}
