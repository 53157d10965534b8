//! Section command handlers

use anyhow::{Context, Result};
use todosync_core::{Cancellation, NewSection};

use super::{confirm, report_write, resolve_project, Repo};
use crate::output::Output;

/// List sections, of one project or all
pub async fn list(
    repo: &Repo,
    project: Option<String>,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let sections = match project {
        Some(ref reference) => {
            let id = resolve_project(repo, reference, cancel).await?;
            repo.get_sections(&id, cancel).await?
        }
        None => repo.get_all_sections(cancel).await?,
    };
    output.print_sections(&sections);
    Ok(())
}

pub async fn create(
    repo: &mut Repo,
    project: String,
    name: String,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let project_id = resolve_project(repo, &project, cancel).await?;
    let outcome = repo
        .create_section(&NewSection { name, project_id }, cancel)
        .await
        .context("Failed to create section")?;

    report_write(
        &outcome,
        &format!("Created section: {} ({})", outcome.value.name, outcome.value.id),
        output,
    );
    if output.is_quiet() {
        println!("{}", outcome.value.id);
    }
    Ok(())
}

pub async fn delete(
    repo: &mut Repo,
    id: String,
    yes: bool,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    if !yes && output.should_prompt() {
        println!("Delete section: {} and its tasks", id);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcome = repo
        .delete_section(&id, cancel)
        .await
        .context("Failed to delete section")?;

    report_write(&outcome, &format!("Deleted section: {}", id), output);
    Ok(())
}
