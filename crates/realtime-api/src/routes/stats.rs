//! Exposes `Hub::Stats()` for the monitoring sink collaborator (spec.md
//! §6, §9 "Monitoring hook").

use crate::server::AppState;
use axum::{extract::State, Json};
use realtime_core::Stats;

#[utoipa::path(
    get,
    path = "/realtime/v1/stats",
    responses((status = 200, description = "Live connection and channel counts", body = StatsResponseDoc)),
    tag = "realtime"
)]
pub async fn stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.hub.stats().await)
}

/// `utoipa::ToSchema` cannot be derived on `realtime_core::Stats` without
/// that crate depending on `utoipa`; this doc-only twin keeps the OpenAPI
/// schema accurate without pulling an HTTP-docs dependency into the core.
#[derive(serde::Serialize, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct StatsResponseDoc {
    pub connections: usize,
    pub channels: usize,
    pub per_channel: Vec<ChannelStatsDoc>,
}

#[derive(serde::Serialize, utoipa::ToSchema)]
#[allow(dead_code)]
pub struct ChannelStatsDoc {
    pub topic: String,
    pub subscribers: usize,
    pub has_presence: bool,
}
