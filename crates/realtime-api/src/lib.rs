//! The axum HTTP/WebSocket transport for the realtime subsystem: the
//! `/realtime/v1/websocket` upgrade endpoint, the `/internal/notify-change`
//! mutation-ingress stand-in, monitoring/health endpoints, and OpenAPI
//! docs for the non-realtime surface. Everything stateful lives in
//! `realtime-core`; this crate only drives it over a socket.

pub mod error;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod server;
pub mod ws;

pub use server::{AppState, RealtimeServer};
