//! Project command handlers

use anyhow::{anyhow, Context, Result};
use todosync_core::{Cancellation, NewProject, ProjectUpdate};

use super::{confirm, report_write, resolve_project, Repo};
use crate::output::Output;

/// List all projects
pub async fn list(repo: &Repo, cancel: &Cancellation, output: &Output) -> Result<()> {
    let projects = repo.get_all_projects(cancel).await?;
    output.print_projects(&projects);
    Ok(())
}

/// Show a project with its sections
pub async fn show(
    repo: &Repo,
    reference: String,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let id = resolve_project(repo, &reference, cancel).await?;
    let project = repo
        .get_project(&id, cancel)
        .await?
        .ok_or_else(|| anyhow!("Project not found: {}", reference))?;
    let path = repo.project_path(&id, cancel).await?;
    let sections = repo.get_sections(&id, cancel).await?;

    output.print_project(&project, &path, &sections);
    Ok(())
}

/// Create a project, optionally under a parent
pub async fn create(
    repo: &mut Repo,
    name: String,
    parent: Option<String>,
    color: Option<String>,
    favorite: bool,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let parent_id = match parent {
        Some(ref reference) => Some(resolve_project(repo, reference, cancel).await?),
        None => None,
    };

    let new = NewProject {
        name,
        color,
        parent_id,
        is_favorite: favorite,
    };
    let outcome = repo
        .create_project(&new, cancel)
        .await
        .context("Failed to create project")?;

    report_write(
        &outcome,
        &format!("Created project: {} ({})", outcome.value.name, outcome.value.id),
        output,
    );
    if output.is_quiet() {
        println!("{}", outcome.value.id);
    }
    Ok(())
}

/// Rename or restyle a project
pub async fn update(
    repo: &mut Repo,
    reference: String,
    update: ProjectUpdate,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    if update.name.is_none() && update.color.is_none() && update.is_favorite.is_none() {
        output.message("Nothing to change.");
        return Ok(());
    }

    let id = resolve_project(repo, &reference, cancel).await?;
    let outcome = repo
        .update_project(&id, &update, cancel)
        .await
        .context("Failed to update project")?;

    report_write(&outcome, &format!("Updated project: {}", id), output);
    Ok(())
}

/// Delete a project and everything in it
pub async fn delete(
    repo: &mut Repo,
    reference: String,
    yes: bool,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let id = resolve_project(repo, &reference, cancel).await?;

    if !yes && output.should_prompt() {
        let name = repo
            .get_project(&id, cancel)
            .await?
            .map(|p| p.name)
            .unwrap_or_else(|| id.clone());
        println!("Delete project: {} ({}) and all of its tasks", name, id);
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcome = repo
        .delete_project(&id, cancel)
        .await
        .context("Failed to delete project")?;

    report_write(&outcome, &format!("Deleted project: {}", id), output);
    Ok(())
}
