//! Error Types for the Colmeia API
//!
//! This module defines error handling for the API layer, including:
//! - ApiError struct for structured error responses
//! - ErrorCode enum for categorizing errors
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON `{code, message, details?}` with the
//! status code of their category. The AI proxy routes are the one exception
//! and render their own body (see `crate::ai`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use colmeia_core::{ColmeiaError, ConfigError, IdentityError, StorageError, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
///
/// Each error code maps to a specific HTTP status code and represents
/// a category of error that can occur during API operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Authentication Errors (401, 403)
    // ========================================================================
    /// Request lacks valid authentication credentials
    Unauthorized,

    /// Request is authenticated but lacks permission for the resource
    Forbidden,

    /// Authentication token is invalid, expired or revoked
    InvalidToken,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request validation failed
    ValidationFailed,

    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found / Conflict (404, 409)
    // ========================================================================
    /// Requested entity does not exist
    EntityNotFound,

    /// Entity with the same identity already exists
    EntityAlreadyExists,

    /// Operation conflicts with the current state of the resource
    StateConflict,

    // ========================================================================
    // Server Errors (5xx)
    // ========================================================================
    /// Unexpected internal error
    InternalError,

    /// Relational store operation failed
    DatabaseError,

    /// Document store operation failed
    DocumentStoreError,

    /// Identity provider call failed
    IdentityError,

    /// A dependency is temporarily unavailable
    ServiceUnavailable,

    /// No database connection could be acquired in time
    ConnectionPoolExhausted,

    /// Operation timed out
    Timeout,

    // ========================================================================
    // Rate Limiting (429)
    // ========================================================================
    /// Rate limit exceeded
    TooManyRequests,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized | ErrorCode::InvalidToken => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::EntityAlreadyExists | ErrorCode::StateConflict => StatusCode::CONFLICT,

            ErrorCode::InternalError
            | ErrorCode::DatabaseError
            | ErrorCode::DocumentStoreError
            | ErrorCode::IdentityError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable | ErrorCode::ConnectionPoolExhausted => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ErrorCode::Timeout => StatusCode::GATEWAY_TIMEOUT,

            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Authentication required",
            ErrorCode::Forbidden => "Access denied",
            ErrorCode::InvalidToken => "Invalid token",
            ErrorCode::ValidationFailed => "Request validation failed",
            ErrorCode::InvalidInput => "Invalid input provided",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::EntityNotFound => "Entity not found",
            ErrorCode::EntityAlreadyExists => "Entity already exists",
            ErrorCode::StateConflict => "Operation conflicts with current state",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::DocumentStoreError => "Document store operation failed",
            ErrorCode::IdentityError => "Identity provider operation failed",
            ErrorCode::ServiceUnavailable => "Service temporarily unavailable",
            ErrorCode::ConnectionPoolExhausted => "Database connection pool exhausted",
            ErrorCode::Timeout => "Operation timed out",
            ErrorCode::TooManyRequests => "Rate limit exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured API error returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    /// Add additional details to the error.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// The single message returned for every rejected token, whatever the cause.
    pub fn invalid_token() -> Self {
        Self::from_code(ErrorCode::InvalidToken)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityAlreadyExists, message)
    }

    pub fn state_conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::StateConflict, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn document_store_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DocumentStoreError, message)
    }

    pub fn identity_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::IdentityError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    pub fn connection_pool_exhausted() -> Self {
        Self::from_code(ErrorCode::ConnectionPoolExhausted)
    }

    /// Create a Timeout error.
    pub fn timeout(operation: &str) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("Operation '{}' timed out", operation),
        )
    }

    /// Create a TooManyRequests error.
    pub fn too_many_requests(retry_after_secs: Option<u64>) -> Self {
        let message = match retry_after_secs {
            Some(secs) => format!("Rate limit exceeded. Retry after {} seconds", secs),
            None => "Rate limit exceeded".to_string(),
        };
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

// ============================================================================
// CONVERSIONS FROM STANDARD ERRORS
// ============================================================================

/// Convert from tokio_postgres::Error to ApiError.
impl From<tokio_postgres::Error> for ApiError {
    fn from(err: tokio_postgres::Error) -> Self {
        tracing::error!("Database error: {:?}", err);

        // Generic message so SQL details never reach clients
        ApiError::database_error("Database operation failed")
    }
}

/// Convert from deadpool_postgres::PoolError to ApiError.
impl From<deadpool_postgres::PoolError> for ApiError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        tracing::error!("Connection pool error: {:?}", err);

        match err {
            deadpool_postgres::PoolError::Timeout(_) => ApiError::connection_pool_exhausted(),
            deadpool_postgres::PoolError::Closed => {
                ApiError::service_unavailable("Database connection pool is closed")
            }
            _ => ApiError::database_error("Failed to acquire database connection"),
        }
    }
}

/// Convert from serde_json::Error to ApiError.
impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        tracing::error!("JSON serialization error: {:?}", err);
        ApiError::invalid_input(format!("Invalid JSON: {}", err))
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match &err {
            StorageError::NotFound { .. } => ApiError::not_found(err.to_string()),
            StorageError::AlreadyExists { .. } => ApiError::already_exists(err.to_string()),
            StorageError::UserNotFound { .. } | StorageError::AlreadyMember { .. } => {
                ApiError::invalid_input(err.to_string())
            }
            StorageError::InvalidPath { .. } | StorageError::BatchTooLarge { .. } => {
                tracing::error!(error = %err, "Invalid document store request");
                ApiError::internal_error("Invalid document store request")
            }
            StorageError::Unavailable { .. } => {
                tracing::error!(error = %err, "Store unavailable");
                ApiError::service_unavailable("Storage temporarily unavailable")
            }
            StorageError::OperationFailed { store, .. } => {
                tracing::error!(error = %err, "Store operation failed");
                match store {
                    colmeia_core::StoreKind::Relational => {
                        ApiError::database_error("Database operation failed")
                    }
                    colmeia_core::StoreKind::Document => {
                        ApiError::document_store_error("Document store operation failed")
                    }
                }
            }
            StorageError::Decode { .. } | StorageError::LockPoisoned => {
                tracing::error!(error = %err, "Storage error");
                ApiError::internal_error("Internal storage error")
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match &err {
            IdentityError::InvalidToken { .. } | IdentityError::TokenRevoked => {
                ApiError::invalid_token()
            }
            IdentityError::EmailExists { .. } => ApiError::already_exists("User already exists"),
            IdentityError::UserNotFound { .. } => ApiError::not_found("User not found"),
            IdentityError::InvalidCredentials | IdentityError::UserDisabled => {
                ApiError::unauthorized("Invalid credentials")
            }
            IdentityError::TooManyAttempts => ApiError::too_many_requests(None),
            IdentityError::RequestFailed { .. }
            | IdentityError::InvalidResponse { .. }
            | IdentityError::Signing { .. } => {
                tracing::error!(error = %err, "Identity provider error");
                ApiError::identity_error("Identity provider operation failed")
            }
        }
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::RequiredFieldMissing { field } => ApiError::missing_field(&field),
            ValidationError::InvalidValue { .. } => ApiError::validation_failed(err.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::internal_error(format!("Configuration error: {}", err))
    }
}

impl From<ColmeiaError> for ApiError {
    fn from(err: ColmeiaError) -> Self {
        match err {
            ColmeiaError::Storage(e) => e.into(),
            ColmeiaError::Identity(e) => e.into(),
            ColmeiaError::Validation(e) => e.into(),
            ColmeiaError::Config(e) => e.into(),
        }
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use colmeia_core::StoreKind;

    #[test]
    fn test_error_code_status_mapping() {
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::MissingField.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::EntityNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::EntityAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ErrorCode::DocumentStoreError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_timeout_error() {
        let err = ApiError::timeout("request");
        assert_eq!(err.code, ErrorCode::Timeout);
        assert_eq!(err.status_code(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(err.message, "Operation 'request' timed out");
    }

    #[test]
    fn test_missing_field_message() {
        let err = ApiError::missing_field("email");
        assert_eq!(err.code, ErrorCode::MissingField);
        assert_eq!(err.message, "Required field 'email' is missing");
    }

    #[test]
    fn test_error_serialization() -> Result<(), serde_json::Error> {
        let err = ApiError::forbidden("Access denied").with_details(serde_json::json!({"id": 3}));
        let json = serde_json::to_value(&err)?;
        assert_eq!(json["code"], "FORBIDDEN");
        assert_eq!(json["message"], "Access denied");
        assert_eq!(json["details"]["id"], 3);

        let plain = serde_json::to_value(ApiError::invalid_token())?;
        assert!(plain.get("details").is_none());
        assert_eq!(plain["message"], "Invalid token");
        Ok(())
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: ApiError = StorageError::not_found("Task", "x").into();
        assert_eq!(err.code, ErrorCode::EntityNotFound);

        let err: ApiError = StorageError::document("boom").into();
        assert_eq!(err.code, ErrorCode::DocumentStoreError);
        assert!(!err.message.contains("boom"));

        let err: ApiError = StorageError::Unavailable {
            store: StoreKind::Relational,
            reason: "down".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let err: ApiError = StorageError::AlreadyMember {
            email: "a@b.c".to_string(),
            workspace_id: 1,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_identity_error_conversion() {
        let err: ApiError = IdentityError::TokenRevoked.into();
        assert_eq!(err, ApiError::invalid_token());

        let err: ApiError = IdentityError::EmailExists {
            email: "a@b.c".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.message, "User already exists");

        let err: ApiError = IdentityError::InvalidCredentials.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_error_display() {
        let err = ApiError::database_error("Connection failed");
        let display = format!("{}", err);
        assert!(display.contains("DatabaseError"));
        assert!(display.contains("Connection failed"));
    }
}
