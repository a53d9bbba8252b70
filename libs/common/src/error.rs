//! Custom error types for the common library
//!
//! This module defines application-specific error types that can be used
//! throughout the application.

use sqlx::Error as SqlxError;
use thiserror::Error;

/// Custom error type for database operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Error occurred during database connection
    #[error("Database connection error: {0}")]
    Connection(#[source] SqlxError),

    /// Error occurred during database query execution
    #[error("Database query error: {0}")]
    Query(#[source] SqlxError),

    /// Error occurred while creating the schema
    #[error("Database schema error: {0}")]
    Schema(#[source] SqlxError),

    /// Configuration error
    #[error("Database configuration error: {0}")]
    Configuration(String),
}

/// Type alias for Result with DatabaseError
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Errors raised while reading or assigning record attributes
#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    /// The record has no column with this name
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: &'static str, column: String },

    /// The value does not fit the column type
    #[error("Column '{column}' expects {expected}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
    },

    /// The record was deleted and can no longer be saved
    #[error("Record in '{0}' was deleted")]
    Deleted(&'static str),

    /// A persisted record lost its primary key
    #[error("Record in '{0}' has no primary key")]
    MissingPrimaryKey(&'static str),
}

/// Errors returned by the record store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The statement failed in the database
    #[error("Store query error in {operation}: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: SqlxError,
    },

    /// A unique constraint rejected the write
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A column name is not a plain SQL identifier
    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    /// No row with the requested primary key
    #[error("Record not found in '{table}' with id {id}")]
    NotFound { table: &'static str, id: i64 },

    /// Attribute level failure
    #[error(transparent)]
    Record(#[from] RecordError),
}

impl StoreError {
    /// Wrap a sqlx error, singling out unique constraint violations
    pub fn from_sqlx(operation: &'static str, error: SqlxError) -> Self {
        if let SqlxError::Database(db_error) = &error {
            if db_error.is_unique_violation() {
                let constraint = db_error
                    .constraint()
                    .map(str::to_string)
                    .unwrap_or_else(|| db_error.message().to_string());
                return StoreError::UniqueViolation { constraint };
            }
        }

        StoreError::Query {
            operation,
            source: error,
        }
    }
}

/// Type alias for Result with StoreError
pub type StoreResult<T> = Result<T, StoreError>;
