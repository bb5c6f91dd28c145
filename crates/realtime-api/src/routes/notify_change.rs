//! Narrow stand-in for the REST layer's `NotifyChange` hook (spec.md §6,
//! SPEC_FULL.md §6): reachable over HTTP so the change pipeline can be
//! driven and integration-tested without embedding the rest of the
//! product. Internal/test-only — not part of the client-facing API.

use crate::error::ErrorResponse;
use crate::server::AppState;
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use realtime_common::{ChangeEvent, ChangeEventType};
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct NotifyChangeRequest {
    pub schema: String,
    pub table: String,
    pub commit_timestamp: DateTime<Utc>,
    pub event_type: ChangeEventTypeDoc,
    pub new_row: Option<Value>,
    pub old_row: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeEventTypeDoc {
    Insert,
    Update,
    Delete,
}

impl From<NotifyChangeRequest> for ChangeEvent {
    fn from(req: NotifyChangeRequest) -> Self {
        let event_type = match req.event_type {
            ChangeEventTypeDoc::Insert => ChangeEventType::Insert,
            ChangeEventTypeDoc::Update => ChangeEventType::Update,
            ChangeEventTypeDoc::Delete => ChangeEventType::Delete,
        };
        ChangeEvent {
            schema: req.schema,
            table: req.table,
            commit_timestamp: req.commit_timestamp,
            event_type,
            new_row: req.new_row,
            old_row: req.old_row,
        }
    }
}

/// Accept a committed mutation event from the REST layer's mutation hook.
///
/// Internal/test-only: not part of the client-facing API surface.
#[utoipa::path(
    post,
    path = "/internal/notify-change",
    request_body = NotifyChangeRequest,
    responses(
        (status = 202, description = "Event accepted for asynchronous dispatch"),
        (status = 400, description = "Malformed change event", body = ErrorResponse),
    ),
    tag = "internal"
)]
pub async fn notify_change(State(state): State<AppState>, Json(req): Json<NotifyChangeRequest>) -> StatusCode {
    state.hub.notify_change(req.into());
    StatusCode::ACCEPTED
}
