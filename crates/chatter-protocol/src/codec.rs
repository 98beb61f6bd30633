//! Codec for encoding and decoding chatter events.
//!
//! Events are JSON objects sent as individual text frames; the transport
//! provides framing, so no length prefix is added here.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum encoded event size (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds the size limit.
    #[error("Frame size {size} exceeds maximum {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode an event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if the event is too large or encoding fails.
pub fn encode<T: Serialize>(frame: &T) -> Result<String, ProtocolError> {
    FrameCodec::default().encode(frame)
}

/// Decode an event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the data is too large or is not a valid event.
pub fn decode<T: DeserializeOwned>(data: &str) -> Result<T, ProtocolError> {
    FrameCodec::default().decode(data)
}

/// Codec with a configurable size ceiling.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    /// Create a codec that rejects frames larger than `max_frame_size` bytes.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the configured size ceiling.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode an event.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the result is too large.
    pub fn encode<T: Serialize>(&self, frame: &T) -> Result<String, ProtocolError> {
        let text = serde_json::to_string(frame).map_err(ProtocolError::Encode)?;
        self.check_size(text.len())?;
        Ok(text)
    }

    /// Decode an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or invalid.
    pub fn decode<T: DeserializeOwned>(&self, data: &str) -> Result<T, ProtocolError> {
        self.check_size(data.len())?;
        serde_json::from_str(data).map_err(ProtocolError::Decode)
    }

    fn check_size(&self, size: usize) -> Result<(), ProtocolError> {
        if size > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size,
                limit: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frames::{ClientFrame, ServerFrame, UserId};

    #[test]
    fn test_encode_decode_send() {
        let frame = ClientFrame::send(UserId::new("bob"), "hello");
        let encoded = encode(&frame).unwrap();
        let decoded: ClientFrame = decode(&encoded).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn test_decode_garbage() {
        match decode::<ClientFrame>("not json") {
            Err(ProtocolError::Decode(_)) => {}
            other => panic!("Expected Decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::new(32);
        let frame = ClientFrame::send(UserId::new("bob"), "x".repeat(64));

        match codec.encode(&frame) {
            Err(ProtocolError::FrameTooLarge { limit, .. }) => assert_eq!(limit, 32),
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }

        let oversized = format!(r#"{{"text":"{}"}}"#, "y".repeat(64));
        assert!(matches!(
            codec.decode::<ClientFrame>(&oversized),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn test_presence_decodes_as_server_frame() {
        let frame: ServerFrame = decode(r#"{"online":[{"userId":"u1","username":"alice"}]}"#).unwrap();
        match frame {
            ServerFrame::Presence { online } => {
                assert_eq!(online.len(), 1);
                assert_eq!(online[0].username, "alice");
            }
            other => panic!("Expected presence, got {:?}", other),
        }
    }
}
