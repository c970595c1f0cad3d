//! Error types for chatroute
//!
//! All errors implement `IntoResponse` for Axum handlers. Failures inside one
//! user's pipeline are contained there; handlers only ever see a generic
//! message, never internal diagnostics.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Arbitration call failed: {0}")]
    Arbitration(String),

    #[error("Dispatch to {route} generator failed: {reason}")]
    Dispatch { route: String, reason: String },

    #[error("Dispatch to {route} generator timed out after {timeout_seconds} seconds")]
    DispatchTimeout { route: String, timeout_seconds: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Storage(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            Self::Arbitration(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::Dispatch { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            Self::DispatchTimeout { .. } => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_creates() {
        let err = AppError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");
    }

    #[test]
    fn test_validation_error_creates() {
        let err = AppError::Validation("invalid input".to_string());
        assert_eq!(err.to_string(), "Invalid request: invalid input");
    }

    #[test]
    fn test_dispatch_timeout_error_message() {
        let err = AppError::DispatchTimeout {
            route: "market_data".to_string(),
            timeout_seconds: 30,
        };
        assert_eq!(
            err.to_string(),
            "Dispatch to market_data generator timed out after 30 seconds"
        );
    }

    #[test]
    fn test_validation_error_response_status() {
        let err = AppError::Validation("test".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_dispatch_error_response_status() {
        let err = AppError::Dispatch {
            route: "knowledge".to_string(),
            reason: "connection refused".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_dispatch_timeout_response_status() {
        let err = AppError::DispatchTimeout {
            route: "conversation".to_string(),
            timeout_seconds: 5,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_storage_error_response_status() {
        let err = AppError::Storage("disk full".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
