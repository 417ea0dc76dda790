use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Errors surfaced by the store services.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid reference: {0}")]
    InvalidReference(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Cycle detected: {0}")]
    CycleDetected(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unexpected storage error: {0}")]
    Unexpected(String),
}

impl StoreError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_reference(msg: impl Into<String>) -> Self {
        Self::InvalidReference(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => StoreError::Conflict(msg),
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => StoreError::InvalidReference(msg),
            _ => StoreError::Unexpected(err.to_string()),
        }
    }
}

/// True when the database rejected a write because of a unique index.
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
