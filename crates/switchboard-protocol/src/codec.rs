//! JSON codec for Switchboard frames.
//!
//! Transports deliver discrete frames, so a frame is exactly one JSON
//! document with no length prefix.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum frame size (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame exceeds maximum size.
    #[error("Frame size {0} exceeds maximum {MAX_FRAME_SIZE}")]
    FrameTooLarge(usize),

    /// JSON encoding or decoding error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Encode a value as a JSON frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Bytes, ProtocolError> {
    let payload = serde_json::to_vec(value)?;

    if payload.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    Ok(Bytes::from(payload))
}

/// Decode a JSON frame.
///
/// # Errors
///
/// Returns an error if the frame is too large or is not a valid `T`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, ProtocolError> {
    if data.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }

    Ok(serde_json::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackplaneNotice, ClientEnvelope, GroupMessage, InboundMessage};

    #[test]
    fn test_decode_inbound() {
        let inbound: InboundMessage = decode(br#"{"message":"hi","group_id":"g1"}"#).unwrap();
        assert_eq!(inbound.message, "hi");
        assert_eq!(inbound.group_id, "g1");
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode::<InboundMessage>(b"not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            decode::<InboundMessage>(br#"{"message":"hi"}"#),
            Err(ProtocolError::Json(_))
        ));
    }

    #[test]
    fn test_message_survives_backplane_hop() {
        let message = GroupMessage {
            message: "hello".into(),
            group_id: "g1".into(),
            client_id: "conn-a".into(),
            user_id: "alice".into(),
        };

        let published = encode(&message).unwrap();
        let received: GroupMessage = decode(&published).unwrap();
        let delivered = encode(&ClientEnvelope::Message(received)).unwrap();

        match decode::<ClientEnvelope>(&delivered).unwrap() {
            ClientEnvelope::Message(m) => assert_eq!(m, message),
            other => panic!("Expected Message envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_notice_encoding() {
        let encoded = encode(&BackplaneNotice::groups_changed(vec!["g1".into()])).unwrap();
        assert_eq!(&encoded[..], br#"{"type":0,"body":{"groups":["g1"]}}"#);
    }

    #[test]
    fn test_frame_too_large() {
        let inbound = InboundMessage {
            message: "a".repeat(MAX_FRAME_SIZE + 1),
            group_id: "g1".into(),
        };

        match encode(&inbound) {
            Err(ProtocolError::FrameTooLarge(_)) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }

        let oversized = vec![b' '; MAX_FRAME_SIZE + 1];
        assert!(matches!(
            decode::<InboundMessage>(&oversized),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }
}
