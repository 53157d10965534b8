//! Storage error handling
//!
//! Provides typed errors for cache operations with descriptive messages
//! and recovery suggestions.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create data directory
    #[error("Failed to create data directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to open the database file
    #[error("Failed to open cache at '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A statement failed; `operation` names what was being done
    #[error("Cache error during {operation}{}: {source}", id_suffix(.id))]
    Database {
        operation: &'static str,
        id: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    /// `begin` called while a transaction is already open
    #[error("A cache transaction is already open")]
    TransactionActive,

    /// `commit` or `rollback` called without an open transaction
    #[error("No cache transaction is open")]
    NoTransaction,

    /// The store has been closed
    #[error("Cache is closed")]
    Closed,

    /// A stored value could not be decoded
    #[error("Corrupt value in {table}.{column} for '{id}': {details}")]
    Corrupt {
        table: &'static str,
        column: &'static str,
        id: String,
        details: String,
    },
}

fn id_suffix(id: &Option<String>) -> String {
    match id {
        Some(id) => format!(" (id {})", id),
        None => String::new(),
    }
}

impl StorageError {
    /// Wrap a database error with the operation that caused it
    pub fn db(operation: &'static str, source: rusqlite::Error) -> Self {
        StorageError::Database {
            operation,
            id: None,
            source,
        }
    }

    /// Wrap a database error with the operation and entity id
    pub fn db_with_id(operation: &'static str, id: &str, source: rusqlite::Error) -> Self {
        StorageError::Database {
            operation,
            id: Some(id.to_string()),
            source,
        }
    }

    /// Check if this error is recoverable by re-running sync
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            StorageError::Database { .. } | StorageError::Corrupt { .. }
        )
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            StorageError::Database { .. } => {
                Some("Run `todosync sync` again. Previously synced data is unchanged.")
            }
            StorageError::Corrupt { .. } => {
                Some("Run `todosync cache reset` followed by `todosync sync` to rebuild the cache.")
            }
            StorageError::CreateDirectory { .. } | StorageError::Open { .. } => {
                Some("Check that the data directory exists and you have write permissions.")
            }
            _ => None,
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_error_display_with_id() {
        let err = StorageError::db_with_id(
            "upsert task",
            "42",
            rusqlite::Error::QueryReturnedNoRows,
        );

        let msg = err.to_string();
        assert!(msg.contains("upsert task"));
        assert!(msg.contains("id 42"));
        assert!(err.is_recoverable());
        assert!(err.recovery_suggestion().is_some());
    }

    #[test]
    fn test_database_error_display_without_id() {
        let err = StorageError::db("read sync token", rusqlite::Error::QueryReturnedNoRows);
        let msg = err.to_string();
        assert!(msg.contains("read sync token"));
        assert!(!msg.contains("(id"));
    }

    #[test]
    fn test_transaction_errors_not_recoverable() {
        assert!(!StorageError::TransactionActive.is_recoverable());
        assert!(!StorageError::NoTransaction.is_recoverable());
        assert!(StorageError::Closed.recovery_suggestion().is_none());
    }

    #[test]
    fn test_corrupt_display() {
        let err = StorageError::Corrupt {
            table: "tasks",
            column: "labels",
            id: "9".to_string(),
            details: "expected array".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("tasks.labels"));
        assert!(msg.contains("expected array"));
    }
}
