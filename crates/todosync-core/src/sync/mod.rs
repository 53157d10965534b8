//! Delta sync between the remote service and the local cache
//!
//! ## Protocol
//!
//! 1. First run: request token `"*"`, replace the cache with the snapshot
//! 2. Later runs: request changes since the stored token, apply them
//! 3. Store the new token in the same transaction as the changes
//!
//! ## Usage
//!
//! ```ignore
//! let mut engine = SyncEngine::new(remote, store, &config);
//! let report = engine.incremental_sync(&Cancellation::never()).await?;
//! ```

mod background;
mod cancel;
mod engine;
mod error;

pub use background::{spawn_background_sync, BackgroundSyncHandle, SyncCommand, SyncEvent};
pub(crate) use cancel::call_remote;
pub use cancel::{cancellation, CancelHandle, Cancellation};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
