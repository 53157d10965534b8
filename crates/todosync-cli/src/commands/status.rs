//! Status command handler

use anyhow::Result;

use super::Repo;
use crate::output::Output;

/// Show sync metadata and cache contents
pub fn show(repo: &Repo, output: &Output) -> Result<()> {
    let status = repo.sync_status()?;
    let counts = repo.cache_counts()?;
    output.print_status(&status, &counts, repo.config());
    Ok(())
}
