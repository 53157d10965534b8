//! Sync engine
//!
//! Reconciles the local cache with the remote service.
//!
//! ## Modes
//!
//! - **Initial sync**: token `"*"`, the response replaces the cache
//! - **Incremental sync**: stored token, the response is a delta applied
//!   on top of the cache (tombstones delete, everything else upserts)
//!
//! ## Consistency
//!
//! The remote call completes before the cache is touched. Each response is
//! applied in one transaction: entity writes, then token and timestamp,
//! then commit. Any failure rolls the whole batch back, so the stored
//! token only ever moves to a token whose changes are fully applied.

use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::cancel::{call_remote, Cancellation};
use super::error::{SyncError, SyncResult};
use crate::config::Config;
use crate::models::{ChangeCounts, SyncMode, SyncReport, SyncStatus};
use crate::remote::{RemoteClient, RemoteError, SyncRequest, SyncResponse, ALL_RESOURCES};
use crate::storage::{CacheStore, StorageResult};

const INITIAL: &str = "initial sync";
const INCREMENTAL: &str = "incremental sync";

/// Sync engine owning a remote client and a cache store
pub struct SyncEngine<R, S> {
    remote: R,
    store: S,
    request_timeout: Duration,
}

impl<R: RemoteClient, S: CacheStore> SyncEngine<R, S> {
    /// Create an engine using the configured request deadline
    pub fn new(remote: R, store: S, config: &Config) -> Self {
        Self::with_timeout(remote, store, config.request_timeout())
    }

    pub fn with_timeout(remote: R, store: S, request_timeout: Duration) -> Self {
        Self {
            remote,
            store,
            request_timeout,
        }
    }

    pub fn remote(&self) -> &R {
        &self.remote
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Mutable store access for mirrored writes.
    ///
    /// Callers must not leave a transaction open.
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Fetch a full snapshot and replace the cache with it.
    ///
    /// Safe to call at any time; re-bootstraps an existing cache.
    pub async fn initial_sync(&mut self, cancel: &Cancellation) -> SyncResult<SyncReport> {
        info!("Starting initial sync");
        let request = SyncRequest::full(&ALL_RESOURCES);
        let response = fetch(&self.remote, request, cancel, self.request_timeout).await?;
        self.apply_full(&response)
    }

    /// Full refresh regardless of bootstrap state
    pub async fn force_initial_sync(&mut self, cancel: &Cancellation) -> SyncResult<SyncReport> {
        self.initial_sync(cancel).await
    }

    /// Fetch and apply changes since the stored token.
    ///
    /// Falls back to an initial sync when no bootstrap has committed yet.
    /// An empty delta writes nothing, not even the sync timestamp.
    pub async fn incremental_sync(&mut self, cancel: &Cancellation) -> SyncResult<SyncReport> {
        let bootstrapped = self
            .store
            .is_initial_sync_done()
            .map_err(|e| SyncError::storage(INCREMENTAL, e))?;
        if !bootstrapped {
            info!("Cache has never been bootstrapped, running initial sync");
            return self.initial_sync(cancel).await;
        }

        let token = self
            .store
            .sync_token()
            .map_err(|e| SyncError::storage(INCREMENTAL, e))?;
        debug!("Starting incremental sync from token {}", token);

        let request = SyncRequest::since(token.as_str(), &ALL_RESOURCES);
        let response = fetch(&self.remote, request, cancel, self.request_timeout).await?;

        if response.full_sync {
            // The service decided our token is too old to diff against
            info!("Remote answered with a full snapshot, replacing cache");
            return self.apply_full(&response);
        }

        if response.is_empty() {
            debug!("No remote changes since {}", token);
            return Ok(SyncReport {
                mode: SyncMode::NoChanges,
                projects: ChangeCounts::default(),
                sections: ChangeCounts::default(),
                tasks: ChangeCounts::default(),
                token,
            });
        }

        self.apply_delta(&response)
    }

    /// Current metadata; defaults when nothing has synced yet
    pub fn sync_status(&self) -> SyncResult<SyncStatus> {
        self.store
            .sync_status()
            .map_err(|e| SyncError::storage("sync status", e))
    }

    fn apply_full(&mut self, response: &SyncResponse) -> SyncResult<SyncReport> {
        let report = in_transaction(&mut self.store, |store| {
            store.clear_entities()?;
            let report = write_rows(store, response, SyncMode::Full)?;
            store.set_sync_token(&response.sync_token)?;
            store.set_last_sync_time(Utc::now())?;
            store.set_initial_sync_done(true)?;
            Ok(report)
        })
        .map_err(|e| SyncError::storage(INITIAL, e))?;

        info!(
            "Initial sync complete: {} projects, {} sections, {} tasks",
            report.projects.upserted, report.sections.upserted, report.tasks.upserted
        );
        Ok(report)
    }

    fn apply_delta(&mut self, response: &SyncResponse) -> SyncResult<SyncReport> {
        let report = in_transaction(&mut self.store, |store| {
            let report = write_rows(store, response, SyncMode::Incremental)?;
            store.set_sync_token(&response.sync_token)?;
            store.set_last_sync_time(Utc::now())?;
            Ok(report)
        })
        .map_err(|e| SyncError::storage(INCREMENTAL, e))?;

        info!(
            "Incremental sync complete: {} changes applied",
            report.total_changes()
        );
        Ok(report)
    }
}

/// Call the remote and reject responses without a token.
///
/// Takes the remote alone; the store is not `Sync`, so holding `&SyncEngine`
/// across the await would make engine futures `!Send`.
async fn fetch<R: RemoteClient>(
    remote: &R,
    request: SyncRequest,
    cancel: &Cancellation,
    timeout: Duration,
) -> SyncResult<SyncResponse> {
    let response = call_remote(remote, request, cancel, timeout).await?;
    if response.sync_token.is_empty() {
        return Err(SyncError::Remote(RemoteError::Decode(
            "response carries no sync token".to_string(),
        )));
    }
    Ok(response)
}

/// Run `f` inside a store transaction; commit on success, roll back on
/// any error
fn in_transaction<S, T, F>(store: &mut S, f: F) -> StorageResult<T>
where
    S: CacheStore,
    F: FnOnce(&mut S) -> StorageResult<T>,
{
    store.begin()?;

    let result = f(store).and_then(|value| store.commit().map(|_| value));
    if result.is_err() && store.in_transaction() {
        if let Err(e) = store.rollback() {
            warn!("Rollback after failed sync also failed: {}", e);
        }
    }
    result
}

/// Apply every row of a response; tombstones delete, others upsert
fn write_rows<S: CacheStore>(
    store: &mut S,
    response: &SyncResponse,
    mode: SyncMode,
) -> StorageResult<SyncReport> {
    let mut projects = ChangeCounts::default();
    for row in &response.projects {
        if row.is_deleted {
            store.delete_project(&row.entity.id)?;
            projects.deleted += 1;
        } else {
            store.upsert_project(&row.entity)?;
            projects.upserted += 1;
        }
    }

    let mut sections = ChangeCounts::default();
    for row in &response.sections {
        if row.is_deleted {
            store.delete_section(&row.entity.id)?;
            sections.deleted += 1;
        } else {
            store.upsert_section(&row.entity)?;
            sections.upserted += 1;
        }
    }

    let mut tasks = ChangeCounts::default();
    for row in &response.items {
        if row.is_deleted {
            store.delete_task(&row.entity.id)?;
            tasks.deleted += 1;
        } else {
            store.upsert_task(&row.entity)?;
            tasks.upserted += 1;
        }
    }

    Ok(SyncReport {
        mode,
        projects,
        sections,
        tasks,
        token: response.sync_token.clone(),
    })
}
