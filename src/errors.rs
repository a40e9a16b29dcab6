use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation error: {0}")]
    Validation(String),

    /// The store aborted the transaction because another one touched the
    /// same rows. Safe to retry.
    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl ScoringError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ScoringError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ScoringError::NotFound { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScoringError::ConcurrencyConflict(_) | ScoringError::Timeout(_)
        )
    }
}

impl From<sqlx::Error> for ScoringError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // serialization_failure / deadlock_detected
            sqlx::Error::Database(db)
                if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) =>
            {
                ScoringError::ConcurrencyConflict(db.message().to_string())
            }
            sqlx::Error::RowNotFound => ScoringError::Storage("row not found".to_string()),
            _ => ScoringError::Storage(err.to_string()),
        }
    }
}
