//! Wire message shapes (spec.md §3 "Wire messages", §6 reserved names).
//!
//! These are the serializer's domain: a [`Serializer`](crate::serializer::Serializer)
//! implementation must round-trip each of these types with the fields listed
//! here. The specific framing (JSON, binary, ...) is out of scope for this
//! crate; `serde`'s derive macros give each record a stable field-based shape
//! the way the teacher's envelope types do.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topic used for the keep-alive heartbeat (spec §6).
pub const TOPIC_PHOENIX: &str = "phoenix";
/// Event name for the keep-alive heartbeat.
pub const EVENT_HEARTBEAT: &str = "heartbeat";
/// Event that initiates channel membership.
pub const EVENT_PHX_JOIN: &str = "phx_join";
/// Event that gracefully leaves a channel.
pub const EVENT_PHX_LEAVE: &str = "phx_leave";
/// Server-originated event signaling channel death.
pub const EVENT_PHX_ERROR: &str = "phx_error";
/// Server reply event carried in a [`Reply`].
pub const EVENT_PHX_REPLY: &str = "phx_reply";

/// Reply status, see spec §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Client-to-server or server-to-client data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub join_ref: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

/// Server response to a client `ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub join_ref: Option<String>,
    #[serde(rename = "ref")]
    pub ref_: Option<String>,
    pub topic: String,
    pub status: Status,
    pub payload: Value,
}

impl Reply {
    pub fn ok(join_ref: Option<String>, ref_: Option<String>, topic: impl Into<String>, payload: Value) -> Self {
        Reply { join_ref, ref_, topic: topic.into(), status: Status::Ok, payload }
    }

    pub fn err(join_ref: Option<String>, ref_: Option<String>, topic: impl Into<String>, payload: Value) -> Self {
        Reply { join_ref, ref_, topic: topic.into(), status: Status::Error, payload }
    }

    /// Build the `{reason:"unmatched topic"}` reply spec §4.2/§7.1 names.
    pub fn unmatched_topic(ref_: Option<String>, topic: impl Into<String>) -> Self {
        Reply::err(None, ref_, topic, serde_json::json!({"reason": "unmatched topic"}))
    }

    /// Build the `{reason:"join crashed"}` reply spec §7.3 names.
    pub fn join_crashed(join_ref: Option<String>, topic: impl Into<String>) -> Self {
        Reply::err(join_ref.clone(), join_ref, topic, serde_json::json!({"reason": "join crashed"}))
    }
}

/// Pub/sub fan-out envelope; carries no `ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Broadcast {
    pub topic: String,
    pub event: String,
    pub payload: Value,
}

/// A decoded outbound message, in the shape handed to a [`Serializer`](crate::serializer::Serializer).
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(Message),
    Reply(Reply),
    Broadcast(Broadcast),
}

impl Message {
    pub fn phx_error(join_ref: Option<String>, topic: impl Into<String>) -> Self {
        Message {
            join_ref: join_ref.clone(),
            ref_: join_ref,
            topic: topic.into(),
            event: EVENT_PHX_ERROR.to_string(),
            payload: serde_json::json!({}),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_round_trips_through_json() {
        let r = Reply::ok(Some("7".into()), Some("8".into()), "room:42", serde_json::json!({"echo":"hi"}));
        let encoded = serde_json::to_string(&r).unwrap();
        let decoded: Reply = serde_json::from_str(&encoded).unwrap();
        assert_eq!(r, decoded);
    }

    #[test]
    fn message_round_trips_through_json() {
        let m = Message {
            join_ref: None,
            ref_: Some("1".into()),
            topic: TOPIC_PHOENIX.into(),
            event: EVENT_HEARTBEAT.into(),
            payload: serde_json::json!({}),
        };
        let encoded = serde_json::to_string(&m).unwrap();
        let decoded: Message = serde_json::from_str(&encoded).unwrap();
        assert_eq!(m, decoded);
    }

    #[test]
    fn broadcast_round_trips_through_json() {
        let b = Broadcast { topic: "room:42".into(), event: "msg".into(), payload: serde_json::json!({"body":"hi"}) };
        let encoded = serde_json::to_string(&b).unwrap();
        let decoded: Broadcast = serde_json::from_str(&encoded).unwrap();
        assert_eq!(b, decoded);
    }
}
