//! Builds the axum `Router` and the shared `AppState` every handler
//! closes over. Grounded on `crates/api/src/server.rs`'s `AcpServer`,
//! generalized from a single `/execute` route to the realtime surface.

use crate::middleware::logging::{get_tracing_layer, logging_middleware};
use crate::openapi::ApiDoc;
use crate::{routes, ws};
use axum::{middleware, routing::{get, post}, Router};
use realtime_authn::{ApiKeyValidator, TokenValidator};
use realtime_common::RealtimeConfig;
use realtime_core::Hub;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub api_keys: Arc<dyn ApiKeyValidator>,
    pub tokens: Arc<dyn TokenValidator>,
    pub config: Arc<RealtimeConfig>,
}

pub struct RealtimeServer {
    state: AppState,
}

impl RealtimeServer {
    pub fn new(hub: Arc<Hub>, api_keys: Arc<dyn ApiKeyValidator>, tokens: Arc<dyn TokenValidator>, config: Arc<RealtimeConfig>) -> Self {
        Self {
            state: AppState { hub, api_keys, tokens, config },
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/realtime/v1/websocket", get(ws::websocket_handler))
            .route("/internal/notify-change", post(routes::notify_change::notify_change))
            .route("/realtime/v1/stats", get(routes::stats::stats))
            .route("/health", get(routes::health::health_check))
            .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
            .layer(get_tracing_layer())
            .layer(middleware::from_fn(logging_middleware))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "realtime-api listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}
