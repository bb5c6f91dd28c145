//! Opaque identifiers used across the realtime subsystem.

use std::fmt;
use uuid::Uuid;

/// Locally unique id for one live connection (one transport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A channel topic string, e.g. `realtime:room1` or the literal `phoenix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ChannelTopic(pub String);

impl ChannelTopic {
    pub const HEARTBEAT: &'static str = "phoenix";

    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn is_heartbeat(&self) -> bool {
        self.0 == Self::HEARTBEAT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChannelTopic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChannelTopic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Opaque correlation token echoed back from client requests to server replies.
pub type Ref = Option<String>;

/// Opaque per-channel-instance token a client supplies on `phx_join` and that
/// the server echoes on every push for that channel instance.
pub type JoinRef = Option<String>;
