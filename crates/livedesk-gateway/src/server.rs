// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use livedesk_alarm::AlarmEngine;
use livedesk_assignment::AssignmentEngine;
use livedesk_core::LivedeskError;

use crate::auth::{TokenVerifier, auth_middleware};
use crate::handlers;
use crate::session::SessionGateway;
use crate::ws;

/// State behind the unauthenticated health and metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    pub start_time: std::time::Instant,
    pub node_id: String,
    /// Renders the Prometheus exposition, when metrics are enabled.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub gateway: Arc<SessionGateway>,
    pub verifier: Arc<TokenVerifier>,
    pub assignments: Arc<AssignmentEngine>,
    pub alarms: Arc<AlarmEngine>,
    pub health: HealthState,
}

/// All gateway routes:
/// - `GET /health`, `GET /metrics` (public)
/// - `/v1/assignments/*`, `/v1/alarms/*` (agent JWT)
/// - `GET /ws/chat`, `GET /ws/agent` (token checked before upgrade)
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route(
            "/v1/assignments/{id}/accept",
            post(handlers::accept_assignment),
        )
        .route(
            "/v1/assignments/{id}/decline",
            post(handlers::decline_assignment),
        )
        .route("/v1/assignments/stats", get(handlers::assignment_stats))
        .route(
            "/v1/alarms/{id}/acknowledge",
            post(handlers::acknowledge_alarm),
        )
        .route("/v1/alarms", get(handlers::list_alarms))
        .route("/v1/alarms/stats", get(handlers::alarm_stats))
        .route_layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state.verifier),
            auth_middleware,
        ))
        .with_state(state.clone());

    let ws_routes = Router::new()
        .route("/ws/chat", get(ws::visitor_socket))
        .route("/ws/agent", get(ws::agent_socket))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .merge(ws_routes)
        .layer(CorsLayer::permissive())
}

/// Bind and serve until `shutdown` is cancelled. New sockets stop being
/// accepted as soon as it fires.
pub async fn start_server(
    host: &str,
    port: u16,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), LivedeskError> {
    let app = router(state);

    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LivedeskError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("Gateway server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| LivedeskError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("Gateway server stopped");
    Ok(())
}
