//! Reasons a connection is torn down. Every shutdown must carry one of
//! these, surfaced in `phx_close` payloads and in logs (spec.md §7).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    SlowConsumer,
    HeartbeatTimeout,
    Transport,
    HubUnregister,
    Protocol,
}

impl ShutdownReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SlowConsumer => "slow_consumer",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Transport => "transport",
            Self::HubUnregister => "hub_unregister",
            Self::Protocol => "protocol",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
