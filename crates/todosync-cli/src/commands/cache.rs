//! Cache command handlers

use anyhow::{Context, Result};

use super::{confirm, Repo};
use crate::output::Output;

/// Drop every cached row; the next command bootstraps again
pub fn reset(repo: &mut Repo, yes: bool, output: &Output) -> Result<()> {
    if !yes && output.should_prompt() {
        println!("This removes all cached projects, sections and tasks.");
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    repo.reset_cache().context("Failed to reset cache")?;
    output.success("Cache cleared. Run `todosync sync` to download everything again.");
    Ok(())
}
