// SPDX-FileCopyrightText: 2026 Blufio Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! REST handlers: assignment and alarm operations for agents, plus the
//! public health and metrics endpoints.
//!
//! Every authenticated handler is scoped to the caller's tenant; records
//! of other tenants look exactly like missing ones.

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use livedesk_alarm::{Acknowledgment, AlarmStats};
use livedesk_assignment::{Assignment, AssignmentStats};
use livedesk_core::{ConnectionKind, HealthStatus, LivedeskError};

use crate::auth::AgentIdentity;
use crate::server::GatewayState;

/// Body of `POST /v1/assignments/{id}/decline`.
#[derive(Debug, Default, Deserialize)]
pub struct DeclineRequest {
    #[serde(default)]
    pub reason: String,
}

/// Body of `POST /v1/alarms/{id}/acknowledge`.
#[derive(Debug, Default, Deserialize)]
pub struct AcknowledgeRequest {
    #[serde(default)]
    pub response: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub bus: String,
    pub connections: ConnectionCounts,
}

#[derive(Debug, Serialize)]
pub struct ConnectionCounts {
    pub visitor: usize,
    pub agent: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// [`LivedeskError`] as an HTTP response.
pub struct ApiError(pub LivedeskError);

impl From<LivedeskError> for ApiError {
    fn from(e: LivedeskError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LivedeskError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            LivedeskError::NotFound { .. } => StatusCode::NOT_FOUND,
            LivedeskError::Conflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::warn!(error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

/// POST /v1/assignments/{id}/accept
pub async fn accept_assignment(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AgentIdentity>,
    Path(id): Path<String>,
) -> Result<Json<Assignment>, ApiError> {
    own_assignment(&state, &identity, &id).await?;
    let assignment = state.assignments.accept(&id, &identity.agent_id).await?;
    Ok(Json(assignment))
}

/// POST /v1/assignments/{id}/decline
pub async fn decline_assignment(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AgentIdentity>,
    Path(id): Path<String>,
    body: Option<Json<DeclineRequest>>,
) -> Result<Json<Assignment>, ApiError> {
    own_assignment(&state, &identity, &id).await?;
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let assignment = state
        .assignments
        .decline(&id, &identity.agent_id, &reason)
        .await?;
    Ok(Json(assignment))
}

/// GET /v1/assignments/stats
pub async fn assignment_stats(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AgentIdentity>,
) -> Json<AssignmentStats> {
    Json(state.assignments.stats(&identity.tenant_id).await)
}

/// POST /v1/alarms/{id}/acknowledge
///
/// Any agent of the alarm's project may acknowledge. Repeating the call
/// returns the first acknowledgment.
pub async fn acknowledge_alarm(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AgentIdentity>,
    Path(id): Path<String>,
    body: Option<Json<AcknowledgeRequest>>,
) -> Result<Json<Acknowledgment>, ApiError> {
    if let Some(alarm) = state.alarms.get(&id).await {
        if alarm.tenant_id != identity.tenant_id || !identity.serves(&alarm.project_id) {
            return Err(not_found("alarm", &id));
        }
    }
    let response = body.map(|Json(b)| b.response).unwrap_or_default();
    let ack = state
        .alarms
        .acknowledge(&id, &identity.agent_id, &response)
        .await?;
    Ok(Json(ack))
}

/// GET /v1/alarms
pub async fn list_alarms(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AgentIdentity>,
) -> Response {
    let alarms = state.alarms.active(&identity.tenant_id).await;
    Json(json!({ "alarms": alarms })).into_response()
}

/// GET /v1/alarms/stats
pub async fn alarm_stats(
    State(state): State<GatewayState>,
    Extension(identity): Extension<AgentIdentity>,
) -> Json<AlarmStats> {
    Json(
        state
            .alarms
            .stats(&identity.tenant_id, chrono::Utc::now())
            .await,
    )
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    let registry = state.gateway.registry();
    let bus = match registry.bus().health_check().await {
        Ok(HealthStatus::Healthy) => "healthy".to_string(),
        Ok(HealthStatus::Degraded(reason)) => format!("degraded: {reason}"),
        Ok(HealthStatus::Unhealthy(reason)) => format!("unhealthy: {reason}"),
        Err(e) => format!("unhealthy: {e}"),
    };
    let counts = registry.counts().await;
    Json(HealthResponse {
        status: if bus == "healthy" { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        node_id: state.health.node_id.clone(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        bus,
        connections: ConnectionCounts {
            visitor: counts.get(&ConnectionKind::Visitor).copied().unwrap_or(0),
            agent: counts.get(&ConnectionKind::Agent).copied().unwrap_or(0),
        },
    })
}

/// GET /metrics
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

async fn own_assignment(
    state: &GatewayState,
    identity: &AgentIdentity,
    id: &str,
) -> Result<(), ApiError> {
    match state.assignments.get(id).await {
        Some(a) if a.tenant_id == identity.tenant_id => Ok(()),
        _ => Err(not_found("assignment", id)),
    }
}

fn not_found(kind: &'static str, id: &str) -> ApiError {
    ApiError(LivedeskError::NotFound {
        kind,
        id: id.to_string(),
    })
}
