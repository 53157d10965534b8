//! todosync core library
//!
//! This crate provides the core functionality for todosync, a local-first
//! client for a remote task service. The remote is the source of truth; a
//! SQLite cache keeps reads fast and available offline.
//!
//! # Architecture
//!
//! - **Remote**: authoritative, speaks a token-based delta sync protocol
//! - **SQLite**: local cache, updated by sync and by confirmed writes
//!
//! # Quick Start
//!
//! ```text
//! let mut repo = Repository::open(Config::load()?)?;
//! repo.initialize(&Cancellation::never()).await?;
//!
//! // Query tasks from the cache
//! let tasks = repo.get_tasks(&TaskFilter::default(), &cancel).await?;
//!
//! // Pull remote changes
//! let report = repo.sync(&cancel).await?;
//! ```
//!
//! # Modules
//!
//! - `repository`: Reads and writes for the command layer (main entry point)
//! - `sync`: Sync engine, cancellation and background syncer
//! - `storage`: Cache store trait and its SQLite implementation
//! - `remote`: Remote client trait, wire types and HTTP client
//! - `models`: Projects, sections, tasks and sync bookkeeping
//! - `config`: Application configuration

pub mod config;
pub mod models;
pub mod remote;
pub mod repository;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use models::{
    CacheCounts, NewProject, NewSection, NewTask, Project, ProjectUpdate, Section, SyncMode,
    SyncReport, SyncStatus, Task, TaskFilter, TaskUpdate,
};
pub use remote::{HttpRemote, RemoteClient, RemoteError};
pub use repository::{Repository, RepositoryError, RepositoryResult, WriteOutcome};
pub use storage::{CacheStore, SqliteCache, StorageError};
pub use sync::{cancellation, CancelHandle, Cancellation, SyncEngine, SyncError};
