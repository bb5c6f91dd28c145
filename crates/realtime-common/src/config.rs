//! TOML-driven configuration for the realtime server.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub server: ServerConfig,
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub channel: ChannelDefaults,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    4000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Expected client heartbeat cadence (`T_hb`), default 25s.
    #[serde(default = "default_hb_interval_secs")]
    pub interval_secs: u64,
    /// Connection is shut down if idle past this (`T_hb_timeout`), default 30s.
    #[serde(default = "default_hb_timeout_secs")]
    pub timeout_secs: u64,
    /// Transport write deadline (`T_write`), default a few seconds.
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Join authorization soft deadline (`T_authz`), default 2s.
    #[serde(default = "default_authz_timeout_secs")]
    pub authz_timeout_secs: u64,
}

fn default_hb_interval_secs() -> u64 {
    25
}

fn default_hb_timeout_secs() -> u64 {
    30
}

fn default_write_timeout_secs() -> u64 {
    5
}

fn default_authz_timeout_secs() -> u64 {
    2
}

impl HeartbeatConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn authz_timeout(&self) -> Duration {
        Duration::from_secs(self.authz_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelDefaults {
    /// Bounded per-connection outbound queue capacity.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_queue_capacity: usize,
    /// Capacity of the optional per-channel broadcast replay ring buffer.
    #[serde(default = "default_replay_capacity")]
    pub replay_buffer_capacity: usize,
}

fn default_outbound_capacity() -> usize {
    2048
}

fn default_replay_capacity() -> usize {
    25
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: default_outbound_capacity(),
            replay_buffer_capacity: default_replay_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Accepted API keys for the handshake `apikey` query parameter.
    pub api_keys: Vec<String>,
    /// HMAC secret used to validate `access_token` JWTs.
    pub jwt_secret: String,
}

impl RealtimeConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RealtimeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn for_tests() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            heartbeat: HeartbeatConfig {
                interval_secs: 25,
                timeout_secs: 30,
                write_timeout_secs: 5,
                authz_timeout_secs: 2,
            },
            channel: ChannelDefaults::default(),
            auth: AuthConfig {
                api_keys: vec!["test-anon-key".to_string()],
                jwt_secret: "test-secret".to_string(),
            },
        }
    }
}
