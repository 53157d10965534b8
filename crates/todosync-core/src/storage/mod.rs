//! Storage layer
//!
//! Local cache of the remote task data.
//!
//! ## Architecture
//!
//! - **Remote service**: source of truth
//! - **SQLite**: local cache, written only by sync and by mirrored writes
//!
//! Everything above this layer goes through the `CacheStore` trait.

pub mod cache_store;
pub mod error;
pub mod schema;
pub mod sqlite;

pub use cache_store::CacheStore;
pub use error::{StorageError, StorageResult};
pub use schema::{init_schema, needs_init, SCHEMA_VERSION};
pub use sqlite::SqliteCache;
