//! Error type shared by every callctl crate
//!
//! Workflow failures (stale timeouts, exhausted dial routes, bad action
//! options) live next to storage and peer failures so a single `?` carries
//! them up to the RPC layer, which renders them as `{error, message, status}`.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failure of a call-control operation
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Database Errors ====================
    #[error("Database error: {0}")]
    Database(String),

    #[error("Database pool error: {0}")]
    Pool(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    // ==================== Cache Errors ====================
    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Cache connection failed: {0}")]
    CacheConnection(String),

    // ==================== Call State Errors ====================
    #[error("Call not found: {0}")]
    CallNotFound(String),

    #[error("Invalid call status: {0}")]
    InvalidStatus(String),

    #[error("invalid timed out action condition")]
    InvalidTimedOutAction,

    #[error("Invalid action option: {0}")]
    InvalidActionOption(String),

    #[error("Unsupported action type: {0}")]
    UnsupportedAction(String),

    #[error("no more dialroute left to dial")]
    NoMoreDialroute,

    #[error("External media capacity exceeded: max {max} sessions")]
    ExternalMediaCapacity { max: usize },

    // ==================== Peer Service Errors ====================
    #[error("Peer service {service} failed: {message}")]
    PeerService { service: String, message: String },

    #[error("Peer service {0} timed out")]
    PeerTimeout(String),

    // ==================== Validation Errors ====================
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    // ==================== Resource Errors ====================
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    // ==================== Internal Errors ====================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl AppError {
    /// Shorthand for a peer service failure
    pub fn peer(service: &str, message: impl Into<String>) -> Self {
        AppError::PeerService {
            service: service.to_string(),
            message: message.into(),
        }
    }

    /// True for errors meaning the record is gone rather than broken
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::CallNotFound(_) | AppError::NotFound(_))
    }

    /// Status the RPC layer answers with
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            AppError::Validation(_)
            | AppError::InvalidInput(_)
            | AppError::MissingField(_)
            | AppError::InvalidActionOption(_)
            | AppError::UnsupportedAction(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            AppError::CallNotFound(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,

            // 409 Conflict
            AppError::Conflict(_)
            | AppError::InvalidStatus(_)
            | AppError::InvalidTimedOutAction
            | AppError::NoMoreDialroute
            | AppError::ExternalMediaCapacity { .. } => StatusCode::CONFLICT,

            // 502 Bad Gateway
            AppError::PeerService { .. } => StatusCode::BAD_GATEWAY,

            // 504 Gateway Timeout
            AppError::PeerTimeout(_) => StatusCode::GATEWAY_TIMEOUT,

            // 500 Internal Server Error
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code placed in the `error` field
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Database(_) => "database_error",
            AppError::Pool(_) => "pool_error",
            AppError::Transaction(_) => "transaction_error",
            AppError::Cache(_) => "cache_error",
            AppError::CacheConnection(_) => "cache_connection_error",
            AppError::CallNotFound(_) => "call_not_found",
            AppError::InvalidStatus(_) => "invalid_status",
            AppError::InvalidTimedOutAction => "invalid_timed_out_action",
            AppError::InvalidActionOption(_) => "invalid_action_option",
            AppError::UnsupportedAction(_) => "unsupported_action",
            AppError::NoMoreDialroute => "no_more_dialroute",
            AppError::ExternalMediaCapacity { .. } => "external_media_capacity",
            AppError::PeerService { .. } => "peer_service_error",
            AppError::PeerTimeout(_) => "peer_timeout",
            AppError::Validation(_) => "validation_error",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::MissingField(_) => "missing_field",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict(_) => "conflict",
            AppError::Internal(_) => "internal_error",
            AppError::Config(_) => "config_error",
            AppError::Serialization(_) => "serialization_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        AppError::status_code(self)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let body = json!({
            "error": self.error_code(),
            "message": self.to_string(),
            "status": status.as_u16(),
        });

        HttpResponse::build(status).json(body)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let service = err
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());

        if err.is_timeout() {
            AppError::PeerTimeout(service)
        } else {
            AppError::PeerService {
                service,
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            AppError::CallNotFound("123".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::InvalidTimedOutAction.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::peer("flow-manager", "down").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            AppError::InvalidTimedOutAction.error_code(),
            "invalid_timed_out_action"
        );
        assert_eq!(
            AppError::ExternalMediaCapacity { max: 5 }.error_code(),
            "external_media_capacity"
        );
    }

    #[test]
    fn test_timed_out_action_message() {
        assert_eq!(
            AppError::InvalidTimedOutAction.to_string(),
            "invalid timed out action condition"
        );
    }

    #[test]
    fn test_is_not_found() {
        assert!(AppError::CallNotFound("x".into()).is_not_found());
        assert!(!AppError::Database("x".into()).is_not_found());
    }
}
