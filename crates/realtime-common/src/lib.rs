//! Types and utilities shared by every realtime crate: the wire message
//! envelope, change events and filter specs, claims, the predicate
//! grammar shared by filters and RLS, configuration, and error types.

pub mod change;
pub mod claims;
pub mod config;
pub mod error;
pub mod ids;
pub mod message;
pub mod predicate;
pub mod shutdown;
pub mod tracing_init;

pub use change::{ChangeEvent, ChangeEventType, ChangeFilterSpec, RawChangeFilterSpec};
pub use claims::Claims;
pub use config::RealtimeConfig;
pub use error::{RealtimeError, Result};
pub use ids::{ChannelTopic, ConnectionId, JoinRef, Ref};
pub use message::Message;
pub use predicate::Predicate;
pub use shutdown::ShutdownReason;
