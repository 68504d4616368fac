//! Error types for wardwatch

use rusqlite::ErrorCode;
use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum WardError {
    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WardError {
    /// HTTP status a caller should surface for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication(_) => 401,
            Self::Permission(_) => 403,
            Self::NotFound(_) => 404,
            Self::Validation(_) => 422,
            Self::InvalidTransition(_) => 409,
            Self::Conflict(_) => 409,
            Self::Database(_) => 503,
            Self::Config(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Short machine-readable tag, used in CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Authentication(_) => "authentication",
            Self::Permission(_) => "permission",
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::Conflict(_) => "conflict",
            Self::Database(_) => "database",
            Self::Config(_) => "config",
            Self::Internal(_) => "internal",
        }
    }

    /// SQLite reported the database as busy or locked by another writer
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            Self::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
        )
    }

    /// A UNIQUE / CHECK / FOREIGN KEY constraint rejected the write
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation
        )
    }

    /// Contention that a bounded retry may clear
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_)) || self.is_busy()
    }
}

impl From<serde_json::Error> for WardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for WardError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Authentication(format!("Token error: {}", err))
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, WardError>;
