//! OpenAPI specification for the non-realtime HTTP surface. The
//! WebSocket protocol itself (spec.md §6) is documented in prose since
//! it isn't a request/response REST shape utoipa can describe.
//!
//! Grounded on `crates/api/src/openapi.rs`.

use crate::error::ErrorResponse;
use crate::routes::health::HealthResponse;
use crate::routes::notify_change::{ChangeEventTypeDoc, NotifyChangeRequest};
use crate::routes::stats::{ChannelStatsDoc, StatsResponseDoc};
use utoipa::OpenApi;

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Realtime Subsystem API",
        description = "
Admin/test surface around the realtime message bus. The actual client
protocol lives on the `/realtime/v1/websocket` upgrade endpoint and is
documented in prose: connect with `?apikey=...`, then exchange the
Phoenix-style `{event, topic, payload, ref, join_ref}` frames described
in the subsystem design document.
        ",
        version = "1.0.0"
    ),
    paths(
        crate::routes::notify_change::notify_change,
        crate::routes::stats::stats,
        crate::routes::health::health_check,
    ),
    components(schemas(
        NotifyChangeRequest,
        ChangeEventTypeDoc,
        StatsResponseDoc,
        ChannelStatsDoc,
        HealthResponse,
        ErrorResponse,
    )),
    tags(
        (name = "realtime", description = "Monitoring hooks into the live hub"),
        (name = "internal", description = "Mutation-hook ingress standing in for the REST layer"),
        (name = "health", description = "Liveness")
    )
)]
pub struct ApiDoc;
