//! Standardized API responses.

use analytics_core::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub event_store_connected: bool,
    pub profile_store_connected: bool,
    pub queue_depth: u64,
}

/// Outcome of `POST /analytics/profiles/rebuild`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RebuildResponse {
    /// Profiles written
    pub rebuilt: usize,
    /// Events replayed
    pub events: usize,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = Some(details);
        self
    }
}

/// API error type carrying a stable error code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ErrorResponse,
}

impl ApiError {
    pub fn with_code(status: StatusCode, code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new(msg, code),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_code(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    pub fn validation(status: StatusCode, code: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status,
            response: ErrorResponse::new("Validation failed", code).with_details(errors),
        }
    }

    pub fn code(&self) -> &str {
        &self.response.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = err.error_code();

        if status.is_server_error() {
            error!(code = code, error = %err, "Request failed");
        }

        match &err {
            Error::Validation { message, .. } => {
                ApiError::validation(status, code, vec![message.clone()])
            }
            Error::InvalidEventData { .. } | Error::UnknownEventName(_) => {
                ApiError::validation(status, code, vec![err.to_string()])
            }
            Error::Unauthorized { message, .. } | Error::Database { message, .. } => {
                ApiError::with_code(status, code, message.clone())
            }
            _ => ApiError::with_code(status, code, err.to_string()),
        }
    }
}
