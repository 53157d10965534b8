//! Task command handlers

use anyhow::{anyhow, Context, Result};
use clap::Args;
use todosync_core::{Cancellation, NewTask, TaskFilter, TaskUpdate};

use super::{confirm, report_write, resolve_project, Repo};
use crate::output::Output;

/// Arguments for `task add`
#[derive(Args, Debug)]
pub struct AddArgs {
    /// Task content
    pub content: String,
    /// Project name or id (defaults to the inbox)
    #[arg(short, long)]
    pub project: Option<String>,
    /// Section id
    #[arg(short, long)]
    pub section: Option<String>,
    /// Priority from 1 (normal) to 4 (urgent)
    #[arg(short = 'P', long, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub priority: Option<u8>,
    /// Labels to add
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
    /// Due date in natural language ("tomorrow", "every monday")
    #[arg(short, long)]
    pub due: Option<String>,
    /// Longer description
    #[arg(short = 'D', long)]
    pub description: Option<String>,
}

/// Arguments for `task update`
#[derive(Args, Debug)]
pub struct UpdateArgs {
    /// Task ID
    pub id: String,
    #[arg(short, long)]
    pub content: Option<String>,
    #[arg(short = 'P', long, value_parser = clap::value_parser!(u8).range(1..=4))]
    pub priority: Option<u8>,
    /// Replace all labels
    #[arg(short, long = "label")]
    pub labels: Vec<String>,
    /// New due date; an empty string clears it
    #[arg(short, long)]
    pub due: Option<String>,
    #[arg(short = 'D', long)]
    pub description: Option<String>,
}

impl UpdateArgs {
    fn to_update(&self) -> TaskUpdate {
        TaskUpdate {
            content: self.content.clone(),
            description: self.description.clone(),
            priority: self.priority,
            labels: if self.labels.is_empty() {
                None
            } else {
                Some(self.labels.clone())
            },
            due_string: self.due.clone(),
        }
    }
}

/// List tasks, optionally filtered
pub async fn list(
    repo: &Repo,
    project: Option<String>,
    label: Option<String>,
    all: bool,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let project_id = match project {
        Some(ref reference) => Some(resolve_project(repo, reference, cancel).await?),
        None => None,
    };
    let filter = TaskFilter {
        project_id,
        label,
        include_completed: all,
    };

    let tasks = repo.get_tasks(&filter, cancel).await?;
    output.print_tasks(&tasks);
    Ok(())
}

/// Show a single task
pub async fn show(repo: &Repo, id: String, cancel: &Cancellation, output: &Output) -> Result<()> {
    let task = repo
        .get_task(&id, cancel)
        .await?
        .ok_or_else(|| anyhow!("Task not found: {}", id))?;
    let path = repo
        .project_path(&task.project_id, cancel)
        .await
        .unwrap_or_default();

    output.print_task(&task, &path);
    Ok(())
}

/// Create a task
pub async fn add(repo: &mut Repo, args: AddArgs, cancel: &Cancellation, output: &Output) -> Result<()> {
    let project_id = match args.project {
        Some(ref reference) => Some(resolve_project(repo, reference, cancel).await?),
        None => None,
    };

    let new = NewTask {
        content: args.content,
        description: args.description,
        project_id,
        section_id: args.section,
        priority: args.priority,
        labels: args.labels,
        due_string: args.due,
    };
    let outcome = repo
        .create_task(&new, cancel)
        .await
        .context("Failed to create task")?;

    report_write(&outcome, &format!("Created task: {}", outcome.value.id), output);
    if output.is_quiet() {
        println!("{}", outcome.value.id);
    } else if !output.is_json() {
        output.print_task(&outcome.value, &[]);
    }
    Ok(())
}

/// Change fields of a task
pub async fn update(
    repo: &mut Repo,
    args: UpdateArgs,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let update = args.to_update();
    if update.is_empty() {
        output.message("Nothing to change.");
        return Ok(());
    }

    let outcome = repo
        .update_task(&args.id, &update, cancel)
        .await
        .context("Failed to update task")?;

    report_write(&outcome, &format!("Updated task: {}", args.id), output);
    Ok(())
}

/// Mark a task done
pub async fn done(repo: &mut Repo, id: String, cancel: &Cancellation, output: &Output) -> Result<()> {
    let outcome = repo
        .close_task(&id, cancel)
        .await
        .context("Failed to complete task")?;
    report_write(&outcome, &format!("Completed task: {}", id), output);
    Ok(())
}

pub async fn reopen(
    repo: &mut Repo,
    id: String,
    cancel: &Cancellation,
    output: &Output,
) -> Result<()> {
    let outcome = repo
        .reopen_task(&id, cancel)
        .await
        .context("Failed to reopen task")?;
    report_write(&outcome, &format!("Reopened task: {}", id), output);
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
        if let Some(task) = repo.get_task(&id, cancel).await? {
            println!("Delete task: {} - {}", task.id, task.content);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let outcome = repo
        .delete_task(&id, cancel)
        .await
        .context("Failed to delete task")?;
    report_write(&outcome, &format!("Deleted task: {}", id), output);
    Ok(())
}
