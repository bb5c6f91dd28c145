//! The wire frame exchanged over the `/realtime/v1/websocket` transport.
//!
//! Every frame is UTF-8 JSON carrying `{event, topic, payload, ref,
//! join_ref}`. Inbound events are a closed sum over a small tag set;
//! dispatch on them with an exhaustive match rather than open string
//! comparisons sprinkled through the codebase (spec.md §9).

use crate::ids::{JoinRef, Ref};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_PHX_JOIN: &str = "phx_join";
pub const EVENT_PHX_LEAVE: &str = "phx_leave";
pub const EVENT_ACCESS_TOKEN: &str = "access_token";
pub const EVENT_BROADCAST: &str = "broadcast";
pub const EVENT_PRESENCE: &str = "presence";

pub const EVENT_PHX_REPLY: &str = "phx_reply";
pub const EVENT_PHX_CLOSE: &str = "phx_close";
pub const EVENT_PHX_ERROR: &str = "phx_error";
pub const EVENT_SYSTEM: &str = "system";
pub const EVENT_POSTGRES_CHANGES: &str = "postgres_changes";
pub const EVENT_PRESENCE_STATE: &str = "presence_state";
pub const EVENT_PRESENCE_DIFF: &str = "presence_diff";

pub const TOPIC_PHOENIX: &str = "phoenix";

/// One wire frame, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub event: String,
    pub topic: String,
    #[serde(default = "default_payload")]
    pub payload: Value,
    #[serde(rename = "ref", default)]
    pub reference: Ref,
    #[serde(default)]
    pub join_ref: JoinRef,
}

fn default_payload() -> Value {
    json!({})
}

impl Message {
    pub fn push(topic: impl Into<String>, event: impl Into<String>, payload: Value, join_ref: JoinRef) -> Self {
        Self {
            event: event.into(),
            topic: topic.into(),
            payload,
            reference: None,
            join_ref,
        }
    }

    /// `phx_reply` carrying the `ref` of the request it answers.
    pub fn reply_ok(original: &Message, response: Value) -> Self {
        Self::reply(original, "ok", response)
    }

    pub fn reply_error(original: &Message, reason: impl Into<String>) -> Self {
        Self::reply(original, "error", json!({ "reason": reason.into() }))
    }

    fn reply(original: &Message, status: &str, response: Value) -> Self {
        Self {
            event: EVENT_PHX_REPLY.to_string(),
            topic: original.topic.clone(),
            payload: json!({ "status": status, "response": response }),
            reference: original.reference.clone(),
            join_ref: original.join_ref.clone(),
        }
    }

    /// Protocol-level error: malformed frame or unknown event/topic. Does
    /// not close the connection (spec.md §7).
    pub fn protocol_error(topic: impl Into<String>, reference: Ref) -> Self {
        Self {
            event: EVENT_PHX_ERROR.to_string(),
            topic: topic.into(),
            payload: json!({ "reason": "unknown event/topic" }),
            reference,
            join_ref: None,
        }
    }

    pub fn close(topic: impl Into<String>, join_ref: JoinRef, reason: &str) -> Self {
        Self {
            event: EVENT_PHX_CLOSE.to_string(),
            topic: topic.into(),
            payload: json!({ "reason": reason }),
            reference: None,
            join_ref,
        }
    }
}

/// Closed sum of the events a client may send. Anything else is a
/// protocol error handled uniformly by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Heartbeat,
    PhxJoin,
    PhxLeave,
    AccessToken,
    Broadcast,
    Presence,
}

impl ClientEvent {
    pub fn from_str(event: &str) -> Option<Self> {
        match event {
            EVENT_HEARTBEAT => Some(Self::Heartbeat),
            EVENT_PHX_JOIN => Some(Self::PhxJoin),
            EVENT_PHX_LEAVE => Some(Self::PhxLeave),
            EVENT_ACCESS_TOKEN => Some(Self::AccessToken),
            EVENT_BROADCAST => Some(Self::Broadcast),
            EVENT_PRESENCE => Some(Self::Presence),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_echoes_ref_and_join_ref() {
        let original = Message {
            event: EVENT_PHX_JOIN.to_string(),
            topic: "realtime:room1".to_string(),
            payload: json!({}),
            reference: Some("r1".to_string()),
            join_ref: Some("j1".to_string()),
        };
        let reply = Message::reply_ok(&original, json!({"postgres_changes": []}));
        assert_eq!(reply.event, EVENT_PHX_REPLY);
        assert_eq!(reply.reference, Some("r1".to_string()));
        assert_eq!(reply.join_ref, Some("j1".to_string()));
        assert_eq!(reply.payload["status"], "ok");
    }

    #[test]
    fn unknown_event_has_no_closed_sum_variant() {
        assert_eq!(ClientEvent::from_str("frobnicate"), None);
        assert_eq!(ClientEvent::from_str("heartbeat"), Some(ClientEvent::Heartbeat));
    }

    #[test]
    fn deserializes_minimal_frame_without_ref() {
        let raw = r#"{"event":"heartbeat","topic":"phoenix","payload":{}}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(msg.reference, None);
        assert_eq!(msg.join_ref, None);
    }
}
