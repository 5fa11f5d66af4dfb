//! Error types for Colmeia operations

use thiserror::Error;

/// Which backing store produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Relational,
    Document,
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Relational => write!(f, "relational"),
            StoreKind::Document => write!(f, "document"),
        }
    }
}

/// Storage layer errors, shared by the relational and document stores.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("{entity} already exists: {reason}")]
    AlreadyExists { entity: &'static str, reason: String },

    #[error("User with email {email} not found")]
    UserNotFound { email: String },

    #[error("User {email} is already a member of workspace {workspace_id}")]
    AlreadyMember { email: String, workspace_id: i64 },

    #[error("Invalid path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Batch of {size} exceeds the limit of {limit} writes")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("{store} store unavailable: {reason}")]
    Unavailable { store: StoreKind, reason: String },

    #[error("{store} store operation failed: {reason}")]
    OperationFailed { store: StoreKind, reason: String },

    #[error("Stored data could not be decoded: {reason}")]
    Decode { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StorageError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn relational(reason: impl Into<String>) -> Self {
        StorageError::OperationFailed {
            store: StoreKind::Relational,
            reason: reason.into(),
        }
    }

    pub fn document(reason: impl Into<String>) -> Self {
        StorageError::OperationFailed {
            store: StoreKind::Document,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}

/// Identity provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("An account already exists for {email}")]
    EmailExists { email: String },

    #[error("User not found: {id}")]
    UserNotFound { id: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User account is disabled")]
    UserDisabled,

    #[error("Too many attempts, try again later")]
    TooManyAttempts,

    #[error("Identity request failed with status {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Invalid response from identity provider: {reason}")]
    InvalidResponse { reason: String },

    #[error("Signing failed: {reason}")]
    Signing { reason: String },
}

impl IdentityError {
    pub fn invalid_token(reason: impl Into<String>) -> Self {
        IdentityError::InvalidToken {
            reason: reason.into(),
        }
    }
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Colmeia errors.
#[derive(Debug, Clone, Error)]
pub enum ColmeiaError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Colmeia operations.
pub type ColmeiaResult<T> = Result<T, ColmeiaError>;

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StorageError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::not_found("Task", "abc");
        let msg = err.to_string();
        assert!(msg.contains("Task not found"));
        assert!(msg.contains("abc"));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_storage_error_display_unavailable_names_store() {
        let err = StorageError::Unavailable {
            store: StoreKind::Document,
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "document store unavailable: timeout");
    }

    #[test]
    fn test_validation_error_display_required_field() {
        let err = ValidationError::RequiredFieldMissing {
            field: "title".to_string(),
        };
        assert_eq!(err.to_string(), "Required field 'title' is missing");
    }

    #[test]
    fn test_identity_error_display_email_exists() {
        let err = IdentityError::EmailExists {
            email: "ana@example.com".to_string(),
        };
        assert!(err.to_string().contains("ana@example.com"));
    }

    #[test]
    fn test_colmeia_error_from_variants() {
        let storage = ColmeiaError::from(StorageError::LockPoisoned);
        assert!(matches!(storage, ColmeiaError::Storage(_)));

        let identity = ColmeiaError::from(IdentityError::TokenRevoked);
        assert!(matches!(identity, ColmeiaError::Identity(_)));

        let validation = ColmeiaError::from(ValidationError::RequiredFieldMissing {
            field: "name".to_string(),
        });
        assert!(matches!(validation, ColmeiaError::Validation(_)));

        let config = ColmeiaError::from(ConfigError::MissingRequired {
            field: "AI_API_BASE_URL".to_string(),
        });
        assert!(matches!(config, ColmeiaError::Config(_)));
    }
}
