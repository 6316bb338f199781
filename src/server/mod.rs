//! HTTP boundary for the webhook pipeline.
//!
//! Routing, middleware, tracing/metrics initialisation and graceful
//! shutdown. Everything here is transport plumbing; decisions about a
//! notification are made by [`WebhookProcessor`](crate::WebhookProcessor).

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::routing::{get, post};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use error::{ServerError, ServerResult};
pub use state::ServerState;

use crate::config::WebhookConfig;
use self::middleware::{log_requests, request_id};

/// Path Iaptic is configured to deliver to.
pub const WEBHOOK_PATH: &str = "/webhooks/iaptic";

/// Build the Axum router
///
/// Middleware (outermost first): tracing, request id, request logging,
/// timeout, body limit.
pub fn build_router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(routes::receive_notification))
        .route("/health", get(routes::health_check))
        .route("/ready", get(routes::readiness_check))
        .route("/metrics", get(routes::metrics))
        .fallback(routes::not_found)
        .layer(DefaultBodyLimit::max(state.config.max_body_size()))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            state.config.timeout(),
        ))
        .layer(from_fn(log_requests))
        .layer(from_fn(request_id))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Install JSON structured logging filtered by `log_level`
/// (an `EnvFilter` directive such as `info` or `iaptic_webhook=debug`).
pub fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .json()
        .init();
}

/// Install the process-wide Prometheus recorder.
pub fn install_metrics() -> ServerResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|err| ServerError::Metrics(err.to_string()))
}

/// Serve `state` until SIGTERM or Ctrl+C.
pub async fn start_server(state: Arc<ServerState>) -> ServerResult<()> {
    let addr: SocketAddr = state.config.socket_addr()?;
    log_startup(&state.config, addr, state.registry.len());

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn log_startup(config: &WebhookConfig, addr: SocketAddr, schemas: usize) {
    tracing::info!(
        "Starting iaptic webhook receiver on {}{} with {} schemas from {}",
        addr,
        WEBHOOK_PATH,
        schemas,
        config.schema_dir.display()
    );
    tracing::info!(
        "Timeout: {}s, Max body: {}KiB, Metrics: {}",
        config.timeout_secs,
        config.max_body_size_kb,
        config.metrics_enabled
    );
}

/// Shutdown signal handler
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
