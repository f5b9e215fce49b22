//! JSON framing for protocol messages.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Failure to turn a frame into a message or back
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Serialize a message into a text frame
pub fn encode<T: Serialize>(message: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a text frame.
///
/// Unknown `type` tags, missing fields and type mismatches all surface as
/// `CodecError::Malformed`; sessions drop such frames and keep going.
pub fn decode<T: DeserializeOwned>(frame: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(frame)?)
}
