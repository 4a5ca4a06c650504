//! Error handling for the CRM core.
//!
//! Repository and service errors use thiserror for proper error chains.
//! NotFound is surfaced as an empty/None result at the repository boundary
//! wherever possible; the enum variant exists for the HTTP layer, which has
//! to distinguish "no such client" from a store failure.

use thiserror::Error;

/// Main error type for repository and service operations
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} не найден")]
    NotFound(String),

    #[error("{0}")]
    InvalidOperation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Error for a write that the current schema mode does not allow
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AppError::not_found("Клиент");
        assert_eq!(err.to_string(), "Клиент не найден");

        let err = AppError::invalid_operation("Используйте банковский API");
        assert_eq!(err.to_string(), "Используйте банковский API");
    }

    #[test]
    fn test_sqlx_error_conversion() {
        let err: AppError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, AppError::Database(_)));
    }
}
