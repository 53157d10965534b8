//! Command handlers

pub mod cache;
pub mod config;
pub mod project;
pub mod section;
pub mod status;
pub mod sync;
pub mod task;

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;

use anyhow::Result;
use todosync_core::{Cancellation, HttpRemote, Repository, SqliteCache, WriteOutcome};

use crate::output::Output;

/// The repository every handler works against
pub type Repo = Repository<Arc<HttpRemote>, SqliteCache>;

/// Ask a yes/no question; anything but "y"/"yes" (or no terminal) is no
pub fn confirm(prompt: &str) -> Result<bool> {
    if !io::stdin().is_terminal() {
        return Ok(false);
    }

    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    let input = input.trim().to_lowercase();
    Ok(input == "y" || input == "yes")
}

/// Resolve a project reference typed by the user to its id
pub async fn resolve_project(repo: &Repo, reference: &str, cancel: &Cancellation) -> Result<String> {
    Ok(repo.find_project_id_by_name(reference, cancel).await?)
}

/// Report a confirmed write, including a cache mirror warning if any
pub fn report_write<T>(outcome: &WriteOutcome<T>, message: &str, output: &Output) {
    output.success(message);
    if let Some(ref warning) = outcome.warning {
        output.warning(warning);
    }
}
