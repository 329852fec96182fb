//! Database Error Types
//!
//! This module defines error types for database operations, providing
//! clear error handling for connection, initialization, and query failures.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// Database operation errors
///
/// Covers connection, initialization, and statement failures, plus the
/// write-conflict cases the service layer maps to a concurrency error.
/// Tree rule violations are handled by service-layer error types.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish database connection
    #[error("Failed to connect to database at {path}: {source}")]
    ConnectionFailed {
        path: PathBuf,
        source: libsql::Error,
    },

    /// Failed to initialize database schema
    #[error("Failed to initialize database schema: {0}")]
    InitializationFailed(String),

    /// Store configuration rejected before opening
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Failed to create parent directory
    #[error("Failed to create parent directory for database: {0}")]
    DirectoryCreationFailed(#[from] std::io::Error),

    /// libsql operation error
    #[error("Database operation failed: {0}")]
    LibsqlError(libsql::Error),

    /// SQL execution error with context
    #[error("SQL execution failed: {context}")]
    SqlExecutionError { context: String },

    /// Write lock could not be acquired within the busy timeout
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Row changed since it was read (optimistic version check failed)
    #[error("Version conflict on {table} row {id}: expected version {expected}")]
    VersionConflict {
        table: &'static str,
        id: String,
        expected: i64,
    },

    /// UNIQUE / FOREIGN KEY constraint rejected a write
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Row could not be converted into a model
    #[error("Failed to decode {table} row: {reason}")]
    RowDecode { table: &'static str, reason: String },
}

impl DatabaseError {
    /// Create a connection failed error
    pub fn connection_failed(path: PathBuf, source: libsql::Error) -> Self {
        Self::ConnectionFailed { path, source }
    }

    /// Create an initialization failed error
    pub fn initialization_failed(msg: impl Into<String>) -> Self {
        Self::InitializationFailed(msg.into())
    }

    /// Create a SQL execution error with context
    pub fn sql_execution(context: impl Into<String>) -> Self {
        Self::SqlExecutionError {
            context: context.into(),
        }
    }

    pub fn version_conflict(table: &'static str, id: impl Into<String>, expected: i64) -> Self {
        Self::VersionConflict {
            table,
            id: id.into(),
            expected,
        }
    }

    pub fn row_decode(table: &'static str, reason: impl Into<String>) -> Self {
        Self::RowDecode {
            table,
            reason: reason.into(),
        }
    }

    /// `true` for lock contention and stale-version failures
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Busy(_) | Self::VersionConflict { .. })
    }
}

impl From<libsql::Error> for DatabaseError {
    /// Classify libsql failures by their SQLite message.
    ///
    /// libsql surfaces SQLite result codes as text, so lock contention and
    /// constraint failures are recognized from the message.
    fn from(err: libsql::Error) -> Self {
        let message = err.to_string();
        let lower = message.to_lowercase();
        if lower.contains("database is locked") || lower.contains("database is busy") {
            Self::Busy(message)
        } else if lower.contains("constraint failed") {
            Self::ConstraintViolation(message)
        } else {
            Self::LibsqlError(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        assert!(DatabaseError::Busy("locked".into()).is_conflict());
        assert!(DatabaseError::version_conflict("nodes", "n1", 3).is_conflict());
        assert!(!DatabaseError::sql_execution("boom").is_conflict());
        assert!(!DatabaseError::ConstraintViolation("unique".into()).is_conflict());
    }

    #[test]
    fn test_error_messages() {
        let err = DatabaseError::version_conflict("nodes", "n1", 3);
        assert_eq!(
            err.to_string(),
            "Version conflict on nodes row n1: expected version 3"
        );
    }
}
