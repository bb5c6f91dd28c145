//! The Realtime core: Hub (C1), Connection (C2), Channel (C3), Presence
//! (C4), and the Change-Notification pipeline (C5). Transport-agnostic —
//! the actual WebSocket upgrade and read/write loops live in
//! `realtime-api`, which drives this crate's types.

pub mod change_pipeline;
pub mod channel;
pub mod connection;
pub mod error;
pub mod hub;
pub mod join_config;
pub mod metrics;
pub mod presence;

pub use change_pipeline::ChangePipeline;
pub use channel::{Channel, MatchCandidate};
pub use connection::{Connection, ConnectionStats, SlowConsumer};
pub use error::{JoinError, RegisterError};
pub use hub::{ChannelStats, Hub, JoinOutcome, Stats};
pub use join_config::{JoinConfig, JoinConfigError};
pub use metrics::Metrics;
pub use presence::Presence;
