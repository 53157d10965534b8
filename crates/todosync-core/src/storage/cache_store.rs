//! Storage interface for the local cache
//!
//! The sync engine and the repository only talk to the cache through
//! this trait. Writes are explicit upserts keyed by id, deletes are
//! idempotent, and a single transaction may be open at a time.

use chrono::{DateTime, Utc};

use crate::models::{CacheCounts, Project, Section, SyncStatus, Task, TaskFilter};
use crate::storage::error::StorageResult;

/// Transactional per-id storage for projects, sections, tasks and the
/// sync metadata singleton.
///
/// Metadata getters return defaults (`"*"`, `None`, `false`) on a store
/// that has never synced.
pub trait CacheStore: Send {
    // ==================== Entity Writes ====================

    /// Insert or replace a project by id
    fn upsert_project(&mut self, project: &Project) -> StorageResult<()>;

    /// Insert or replace a section by id
    fn upsert_section(&mut self, section: &Section) -> StorageResult<()>;

    /// Insert or replace a task by id
    fn upsert_task(&mut self, task: &Task) -> StorageResult<()>;

    /// Delete a project; returns whether a row existed
    fn delete_project(&mut self, id: &str) -> StorageResult<bool>;

    /// Delete a section; returns whether a row existed
    fn delete_section(&mut self, id: &str) -> StorageResult<bool>;

    /// Delete a task; returns whether a row existed
    fn delete_task(&mut self, id: &str) -> StorageResult<bool>;

    /// Remove every entity row, keeping metadata
    fn clear_entities(&mut self) -> StorageResult<()>;

    // ==================== Entity Reads ====================

    fn get_all_projects(&self) -> StorageResult<Vec<Project>>;

    fn get_project(&self, id: &str) -> StorageResult<Option<Project>>;

    fn get_all_sections(&self) -> StorageResult<Vec<Section>>;

    fn get_sections_by_project(&self, project_id: &str) -> StorageResult<Vec<Section>>;

    fn get_section(&self, id: &str) -> StorageResult<Option<Section>>;

    fn get_tasks(&self, filter: &TaskFilter) -> StorageResult<Vec<Task>>;

    fn get_task(&self, id: &str) -> StorageResult<Option<Task>>;

    /// Active tasks of one project
    fn get_tasks_by_project(&self, project_id: &str) -> StorageResult<Vec<Task>> {
        self.get_tasks(&TaskFilter {
            project_id: Some(project_id.to_string()),
            ..Default::default()
        })
    }

    fn counts(&self) -> StorageResult<CacheCounts>;

    // ==================== Sync Metadata ====================

    fn sync_token(&self) -> StorageResult<String>;

    fn set_sync_token(&mut self, token: &str) -> StorageResult<()>;

    fn last_sync_time(&self) -> StorageResult<Option<DateTime<Utc>>>;

    fn set_last_sync_time(&mut self, time: DateTime<Utc>) -> StorageResult<()>;

    fn is_initial_sync_done(&self) -> StorageResult<bool>;

    fn set_initial_sync_done(&mut self, done: bool) -> StorageResult<()>;

    /// All metadata in one read
    fn sync_status(&self) -> StorageResult<SyncStatus> {
        Ok(SyncStatus {
            bootstrap_done: self.is_initial_sync_done()?,
            last_sync_time: self.last_sync_time()?,
            current_token: self.sync_token()?,
        })
    }

    // ==================== Transactions ====================

    /// Open a transaction; fails if one is already open
    fn begin(&mut self) -> StorageResult<()>;

    fn commit(&mut self) -> StorageResult<()>;

    fn rollback(&mut self) -> StorageResult<()>;

    fn in_transaction(&self) -> bool;

    // ==================== Lifecycle ====================

    /// Drop and recreate all tables, clearing entities and metadata
    fn reset(&mut self) -> StorageResult<()>;

    /// Release the underlying resources; safe to call more than once
    fn close(&mut self) -> StorageResult<()>;
}
