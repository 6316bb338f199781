use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::config::ConfigError;

pub type ServerResult<T> = Result<T, ServerError>;

/// Errors surfaced by the HTTP layer and during startup.
///
/// Pipeline outcomes never become a `ServerError`: the webhook route always
/// acknowledges.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Metrics error: {0}")]
    Metrics(String),

    #[error("Service not ready: {0}")]
    NotReady(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Not found")]
    NotFound,
}

impl ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServerError::NotFound => StatusCode::NOT_FOUND,
            ServerError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Config(_)
            | ServerError::Metrics(_)
            | ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::Metrics(_) => "METRICS_ERROR",
            ServerError::NotReady(_) => "NOT_READY",
            ServerError::Internal(_) => "INTERNAL_ERROR",
            ServerError::NotFound => "NOT_FOUND",
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Internal(format!("IO error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ServerError::NotFound, StatusCode::NOT_FOUND),
            (
                ServerError::NotReady("schema missing".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ServerError::Metrics("recorder installed twice".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ServerError::Config(ConfigError::Validation("port".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_io_error_is_internal() {
        let err = ServerError::from(std::io::Error::other("bind failed"));
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
        assert!(err.to_string().contains("bind failed"));
    }
}
