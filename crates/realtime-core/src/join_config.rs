//! Parses the `config` object a client sends in its `phx_join` payload
//! (spec.md §6 "Join payload recognized options").

use realtime_common::{ChangeFilterSpec, RawChangeFilterSpec};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
struct RawBroadcastConfig {
    #[serde(default)]
    #[serde(rename = "self")]
    self_: bool,
    #[serde(default)]
    ack: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct RawPresenceConfig {
    #[serde(default)]
    key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawJoinConfig {
    #[serde(default)]
    broadcast: RawBroadcastConfig,
    #[serde(default)]
    presence: RawPresenceConfig,
    #[serde(default)]
    postgres_changes: Vec<RawChangeFilterSpec>,
    #[serde(default)]
    private: bool,
}

impl Default for RawBroadcastConfig {
    fn default() -> Self {
        Self { self_: false, ack: false }
    }
}

impl Default for RawPresenceConfig {
    fn default() -> Self {
        Self { key: None }
    }
}

impl Default for RawJoinConfig {
    fn default() -> Self {
        Self {
            broadcast: RawBroadcastConfig::default(),
            presence: RawPresenceConfig::default(),
            postgres_changes: Vec::new(),
            private: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinConfig {
    pub broadcast_self: bool,
    pub broadcast_ack: bool,
    pub presence_key: Option<String>,
    pub filters: Vec<ChangeFilterSpec>,
    pub private: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum JoinConfigError {
    #[error("malformed join config payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("invalid postgres_changes filter: {0}")]
    InvalidFilter(#[from] realtime_common::predicate::PredicateError),
}

impl JoinConfig {
    /// `payload.config`, or all defaults if the client omitted it
    /// entirely (every field in `config` is individually optional).
    pub fn parse(payload: &Value) -> Result<Self, JoinConfigError> {
        let raw: RawJoinConfig = match payload.get("config") {
            Some(config) => serde_json::from_value(config.clone())?,
            None => RawJoinConfig::default(),
        };
        let filters = raw
            .postgres_changes
            .iter()
            .map(ChangeFilterSpec::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            broadcast_self: raw.broadcast.self_,
            broadcast_ack: raw.broadcast.ack,
            presence_key: raw.presence.key,
            filters,
            private: raw.private,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_when_config_omitted() {
        let config = JoinConfig::parse(&json!({})).unwrap();
        assert!(!config.broadcast_self);
        assert!(!config.broadcast_ack);
        assert!(config.presence_key.is_none());
        assert!(config.filters.is_empty());
        assert!(!config.private);
    }

    #[test]
    fn parses_full_config() {
        let payload = json!({
            "config": {
                "broadcast": {"self": true, "ack": true},
                "presence": {"key": "user-42"},
                "postgres_changes": [
                    {"event": "INSERT", "schema": "public", "table": "notes", "filter": "owner_id=eq.U1"}
                ],
                "private": true
            }
        });
        let config = JoinConfig::parse(&payload).unwrap();
        assert!(config.broadcast_self);
        assert!(config.broadcast_ack);
        assert_eq!(config.presence_key.as_deref(), Some("user-42"));
        assert_eq!(config.filters.len(), 1);
        assert!(config.private);
    }
}
