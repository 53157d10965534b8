//! Sync command handler

use anyhow::{Context, Result};
use todosync_core::Cancellation;

use super::Repo;
use crate::output::Output;

/// Pull remote changes into the cache
pub async fn sync(repo: &mut Repo, full: bool, cancel: &Cancellation, output: &Output) -> Result<()> {
    if !repo.config().cache_enabled {
        output.message("Cache is disabled; syncing anyway so it is ready when re-enabled.");
    }

    let report = if full {
        output.message("Running full sync...");
        repo.force_initial_sync(cancel)
            .await
            .context("Full sync failed; the cache is unchanged, run it again to retry")?
    } else {
        repo.sync(cancel)
            .await
            .context("Sync failed; the cache is unchanged, run it again to retry")?
    };

    output.print_sync_report(&report);
    Ok(())
}
