//! Unified error types for the analytics engine.
//!
//! Error codes:
//! - AUTH_001-005: Identity and session errors
//! - VALID_001-003: Envelope validation errors
//! - EVENT_001-002: Event data classification errors
//! - QUERY_001: Query parameter errors
//! - DB_001-002: Storage errors
//! - AGG_001-002: Profile aggregation errors

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Identity error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorCode {
    /// AUTH_001: API key is required
    MissingKey,
    /// AUTH_002: API key is not known
    UnknownKey,
    /// AUTH_003: API key belongs to an inactive account
    InactiveKey,
    /// AUTH_004: Tenant session is required
    SessionRequired,
    /// AUTH_005: API key is not owned by the session user
    Forbidden,
}

impl AuthErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingKey => "AUTH_001",
            Self::UnknownKey => "AUTH_002",
            Self::InactiveKey => "AUTH_003",
            Self::SessionRequired => "AUTH_004",
            Self::Forbidden => "AUTH_005",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Forbidden => 403,
            _ => 401,
        }
    }
}

/// Envelope validation error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationErrorCode {
    /// VALID_001: Malformed JSON or envelope
    InvalidFormat,
    /// VALID_002: Required envelope field missing
    MissingField,
    /// VALID_003: Event exceeds the size limit
    EventTooLarge,
}

impl ValidationErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "VALID_001",
            Self::MissingField => "VALID_002",
            Self::EventTooLarge => "VALID_003",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::EventTooLarge => 413,
            _ => 400,
        }
    }
}

/// Storage error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCode {
    /// DB_001: Storage operation failed
    StoreFailed,
    /// DB_002: Storage operation timed out
    Timeout,
}

impl DbErrorCode {
    /// Get the error code string.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StoreFailed => "DB_001",
            Self::Timeout => "DB_002",
        }
    }

    /// Get the HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::StoreFailed => 500,
            Self::Timeout => 504,
        }
    }
}

/// Unified error type for the analytics engine.
#[derive(Debug, Error)]
pub enum Error {
    /// API key or session could not be resolved.
    #[error("[{code}] {message}")]
    Unauthorized {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Malformed or incomplete event envelope.
    #[error("[{code}] {message}")]
    Validation {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Envelope is well-formed but the payload breaks its event contract.
    #[error("[EVENT_001] invalid {event_name} data: {reason}")]
    InvalidEventData { event_name: String, reason: String },

    /// Event name outside the allow-list.
    #[error("[EVENT_002] unknown event name: {0}")]
    UnknownEventName(String),

    /// Malformed query parameters.
    #[error("[QUERY_001] {0}")]
    Query(String),

    /// Storage failure with code.
    #[error("[{code}] {message}")]
    Database {
        code: &'static str,
        message: String,
        http_status: u16,
    },

    /// Transient failure folding an event into a profile.
    #[error("[AGG_001] aggregation failed: {0}")]
    Aggregation(String),

    /// Conditional profile write lost a race.
    #[error("[AGG_002] profile {key} changed concurrently (expected version {expected:?})")]
    Conflict { key: String, expected: Option<u64> },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an identity error.
    pub fn unauthorized(code: AuthErrorCode, msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create an envelope validation error.
    pub fn validation(code: ValidationErrorCode, msg: impl Into<String>) -> Self {
        Self::Validation {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    /// Create a missing envelope field error.
    pub fn missing_field(field: &str) -> Self {
        Self::validation(
            ValidationErrorCode::MissingField,
            format!("{} is required", field),
        )
    }

    pub fn invalid_event_data(event_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEventData {
            event_name: event_name.into(),
            reason: reason.into(),
        }
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    /// Create a storage error.
    pub fn database(code: DbErrorCode, msg: impl Into<String>) -> Self {
        Self::Database {
            code: code.code(),
            message: msg.into(),
            http_status: code.http_status(),
        }
    }

    pub fn aggregation(msg: impl Into<String>) -> Self {
        Self::Aggregation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Database { .. } | Self::Aggregation(_) | Self::Conflict { .. }
        )
    }

    /// Get the HTTP status code for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Unauthorized { http_status, .. } => *http_status,
            Self::Validation { http_status, .. } => *http_status,
            Self::Database { http_status, .. } => *http_status,
            Self::InvalidEventData { .. } => 422,
            Self::UnknownEventName(_) => 422,
            Self::Query(_) => 400,
            Self::Serialization(_) => 400,
            Self::Conflict { .. } => 409,
            Self::Aggregation(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Get the stable machine-readable code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { code, .. } => code,
            Self::Validation { code, .. } => code,
            Self::Database { code, .. } => code,
            Self::InvalidEventData { .. } => "EVENT_001",
            Self::UnknownEventName(_) => "EVENT_002",
            Self::Query(_) => "QUERY_001",
            Self::Serialization(_) => "VALID_001",
            Self::Aggregation(_) => "AGG_001",
            Self::Conflict { .. } => "AGG_002",
            Self::Internal(_) => "INTERNAL",
        }
    }
}
