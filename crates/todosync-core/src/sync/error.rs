//! Sync engine errors

use thiserror::Error;

use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Errors that can occur during a sync
#[derive(Error, Debug)]
pub enum SyncError {
    /// The remote call failed; the cache was not touched
    #[error("Remote sync failed: {0}")]
    Remote(#[from] RemoteError),

    /// Writing the cache failed; the batch was rolled back
    #[error("{phase} failed to update the cache: {source}")]
    Storage {
        phase: &'static str,
        #[source]
        source: StorageError,
    },

    /// Cancelled before any local write
    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn storage(phase: &'static str, source: StorageError) -> Self {
        SyncError::Storage { phase, source }
    }

    /// Returns true if running the sync again may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Remote(e) => e.is_retryable(),
            SyncError::Storage { source, .. } => source.is_recoverable(),
            SyncError::Cancelled => true,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(SyncError::Remote(RemoteError::Unavailable("down".into())).is_retryable());
        assert!(!SyncError::Remote(RemoteError::Decode("bad".into())).is_retryable());
        assert!(!SyncError::storage("initial sync", StorageError::Closed).is_retryable());
        assert!(SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn test_storage_display_has_phase() {
        let err = SyncError::storage("incremental sync", StorageError::TransactionActive);
        let msg = err.to_string();
        assert!(msg.starts_with("incremental sync"));
        assert!(msg.contains("already open"));
    }
}
