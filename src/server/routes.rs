//! HTTP route handlers
//!
//! - `POST /webhooks/iaptic`: notification delivery, always acknowledged
//! - `GET /health`: liveness
//! - `GET /ready`: readiness (configured schema registered)
//! - `GET /metrics`: Prometheus text exposition

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde_json::json;

use crate::endpoint::Acknowledgement;
use crate::server::error::{ServerError, ServerResult};
use crate::server::state::ServerState;

/// Iaptic delivery endpoint
///
/// Responds `200 {"message": "Notification received."}` whatever the
/// pipeline decided; see [`WebhookEndpoint`](crate::WebhookEndpoint).
pub async fn receive_notification(
    State(state): State<Arc<ServerState>>,
    body: Bytes,
) -> (StatusCode, Json<Acknowledgement>) {
    let ack = state.endpoint.receive(&body).await;
    (StatusCode::OK, Json(ack))
}

/// Health check endpoint (liveness)
pub async fn health_check(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "service": "iaptic-webhook",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
    }))
}

/// Readiness check endpoint
pub async fn readiness_check(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    if !state.is_ready() {
        return Err(ServerError::NotReady(format!(
            "schema {} is not registered",
            state.config.schema_name
        )));
    }

    Ok(Json(json!({
        "status": "ready",
        "service": "iaptic-webhook",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "schemas": state.registry.names(),
    })))
}

/// Prometheus metrics endpoint
pub async fn metrics(State(state): State<Arc<ServerState>>) -> ServerResult<impl IntoResponse> {
    match &state.metrics {
        Some(handle) => Ok((
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )),
        None => Err(ServerError::NotFound),
    }
}

/// 404 Not Found handler
pub async fn not_found() -> ServerError {
    ServerError::NotFound
}
