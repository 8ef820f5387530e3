//! The wire codec boundary (spec §2.1, §6). Plugged in at the edge only:
//! the multiplexer and workers never inspect encoded bytes, they just hand
//! [`Outbound`] values to a `Serializer` and forward whatever comes back to
//! the transport.

use serde_json::Value;

use crate::{
    error::{AsSerializerErrorKind, SerializerErrorKind},
    message::{Broadcast, Message, Outbound, Reply},
};

/// Transport opcode, mirrored from typical WebSocket framing (text vs.
/// binary). The multiplexer never interprets it beyond passing it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Text,
    Binary,
}

/// An already-encoded outbound frame, ready to hand to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub opcode: Opcode,
    pub bytes: Vec<u8>,
}

/// Serializer boundary: decodes inbound payloads into [`Message`], encodes
/// outbound [`Outbound`] values, and offers a distinct `fastlane` entry
/// point for pre-encoding a [`Broadcast`] once per fan-out (spec §4.4).
pub trait Serializer: Send + Sync + 'static {
    type Error: AsSerializerErrorKind + std::error::Error + Send + Sync + 'static;

    fn decode(&self, payload: &[u8]) -> Result<Message, Self::Error>;
    fn encode(&self, msg: &Outbound) -> Result<EncodedFrame, Self::Error>;
    /// Encode a broadcast for direct fastlane delivery, bypassing the
    /// channel worker. Distinct from `encode` so implementations may use a
    /// cheaper or differently-shaped representation for the common case.
    fn fastlane(&self, msg: &Broadcast) -> Result<EncodedFrame, Self::Error>;
}

/// Reference JSON serializer built on `serde_json`, the crate's default
/// (`json` feature) wire codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

#[derive(Debug, thiserror::Error)]
pub enum JsonSerializerError {
    #[error("failed to decode JSON message: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("failed to encode JSON message: {0}")]
    Encode(#[source] serde_json::Error),
}

impl AsSerializerErrorKind for JsonSerializerError {
    fn as_kind(&self) -> SerializerErrorKind {
        match self {
            JsonSerializerError::Decode(_) => SerializerErrorKind::Decode,
            JsonSerializerError::Encode(_) => SerializerErrorKind::Encode,
        }
    }
}

impl Serializer for JsonSerializer {
    type Error = JsonSerializerError;

    fn decode(&self, payload: &[u8]) -> Result<Message, Self::Error> {
        serde_json::from_slice(payload).map_err(JsonSerializerError::Decode)
    }

    fn encode(&self, msg: &Outbound) -> Result<EncodedFrame, Self::Error> {
        let value: Value = match msg {
            Outbound::Message(m) => serde_json::to_value(m),
            Outbound::Reply(r) => serde_json::to_value(r),
            Outbound::Broadcast(b) => serde_json::to_value(b),
        }
        .map_err(JsonSerializerError::Encode)?;
        let bytes = serde_json::to_vec(&value).map_err(JsonSerializerError::Encode)?;
        Ok(EncodedFrame { opcode: Opcode::Text, bytes })
    }

    fn fastlane(&self, msg: &Broadcast) -> Result<EncodedFrame, Self::Error> {
        let bytes = serde_json::to_vec(msg).map_err(JsonSerializerError::Encode)?;
        Ok(EncodedFrame { opcode: Opcode::Text, bytes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_serializer_round_trips_a_join_message() {
        let ser = JsonSerializer;
        let msg = Message {
            join_ref: Some("1".into()),
            ref_: Some("1".into()),
            topic: "room:42".into(),
            event: "phx_join".into(),
            payload: serde_json::json!({"user":"a"}),
        };
        let encoded = serde_json::to_vec(&msg).unwrap();
        let decoded = ser.decode(&encoded).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn fastlane_encodes_broadcast_directly() {
        let ser = JsonSerializer;
        let b = Broadcast { topic: "room:42".into(), event: "msg".into(), payload: serde_json::json!({}) };
        let frame = ser.fastlane(&b).unwrap();
        assert_eq!(frame.opcode, Opcode::Text);
        let round: Broadcast = serde_json::from_slice(&frame.bytes).unwrap();
        assert_eq!(round, b);
    }

    #[test]
    fn reply_for_error_shape_round_trips() {
        let ser = JsonSerializer;
        let reply = Reply::unmatched_topic(Some("3".into()), "nope:1");
        let frame = ser.encode(&Outbound::Reply(reply.clone())).unwrap();
        let value: Value = serde_json::from_slice(&frame.bytes).unwrap();
        assert_eq!(value["status"], "error");
    }
}
