//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;
use todosync_core::models::project_path;
use todosync_core::{CacheCounts, Config, Project, Section, SyncMode, SyncReport, SyncStatus, Task};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print a list of projects as an indented tree
    pub fn print_projects(&self, projects: &[Project]) {
        match self.format {
            OutputFormat::Human => {
                if projects.is_empty() {
                    println!("No projects found.");
                    return;
                }
                for project in projects {
                    let depth = project_path(projects, &project.id).len().saturating_sub(1);
                    let mut flags = String::new();
                    if project.inbox_project {
                        flags.push_str(" (inbox)");
                    }
                    if project.is_favorite {
                        flags.push_str(" *");
                    }
                    if project.is_archived {
                        flags.push_str(" [archived]");
                    }
                    println!(
                        "{:<12} {}{}{}",
                        project.id,
                        "  ".repeat(depth),
                        project.name,
                        flags
                    );
                }
                println!("\n{} project(s)", projects.len());
            }
            OutputFormat::Json => print_json(&projects),
            OutputFormat::Quiet => {
                for project in projects {
                    println!("{}", project.id);
                }
            }
        }
    }

    /// Print one project with its path and sections
    pub fn print_project(&self, project: &Project, path: &[String], sections: &[Section]) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:       {}", project.id);
                println!("Name:     {}", project.name);
                println!("Path:     {}", path.join(" / "));
                println!("Color:    {}", project.color);
                if project.is_favorite {
                    println!("Favorite: yes");
                }
                if project.shared {
                    println!("Shared:   yes");
                }
                if !sections.is_empty() {
                    println!();
                    println!("── Sections ({}) ──", sections.len());
                    for section in sections {
                        println!("{:<12} {}", section.id, section.name);
                    }
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "project": project,
                "path": path,
                "sections": sections,
            })),
            OutputFormat::Quiet => println!("{}", project.id),
        }
    }

    pub fn print_sections(&self, sections: &[Section]) {
        match self.format {
            OutputFormat::Human => {
                if sections.is_empty() {
                    println!("No sections found.");
                    return;
                }
                for section in sections {
                    println!("{:<12} {}", section.id, section.name);
                }
                println!("\n{} section(s)", sections.len());
            }
            OutputFormat::Json => print_json(&sections),
            OutputFormat::Quiet => {
                for section in sections {
                    println!("{}", section.id);
                }
            }
        }
    }

    /// Print a list of tasks
    pub fn print_tasks(&self, tasks: &[Task]) {
        match self.format {
            OutputFormat::Human => {
                if tasks.is_empty() {
                    println!("No tasks found.");
                    return;
                }
                for task in tasks {
                    println!("{}", task_line(task));
                }
                println!("\n{} task(s)", tasks.len());
            }
            OutputFormat::Json => print_json(&tasks),
            OutputFormat::Quiet => {
                for task in tasks {
                    println!("{}", task.id);
                }
            }
        }
    }

    /// Print a single task
    pub fn print_task(&self, task: &Task, path: &[String]) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", task.id);
                println!("Content:     {}", task.content);
                if !task.description.is_empty() {
                    println!("Description: {}", task.description);
                }
                if path.is_empty() {
                    println!("Project:     {}", task.project_id);
                } else {
                    println!("Project:     {}", path.join(" / "));
                }
                println!("Priority:    p{}", task.priority);
                if !task.labels.is_empty() {
                    println!("Labels:      {}", task.labels.join(", "));
                }
                if let Some(ref due) = task.due {
                    let recurring = if due.is_recurring { " (recurring)" } else { "" };
                    println!("Due:         {}{}", due_text(task).unwrap_or_default(), recurring);
                }
                println!("Added:       {}", task.added_at.format("%Y-%m-%d %H:%M"));
                if let Some(completed_at) = task.completed_at {
                    println!("Completed:   {}", completed_at.format("%Y-%m-%d %H:%M"));
                }
            }
            OutputFormat::Json => print_json(task),
            OutputFormat::Quiet => println!("{}", task.id),
        }
    }

    pub fn print_sync_report(&self, report: &SyncReport) {
        match self.format {
            OutputFormat::Human => match report.mode {
                SyncMode::NoChanges => println!("✓ Already up to date"),
                SyncMode::Full => {
                    println!("✓ Full sync complete");
                    println!(
                        "  Projects: {}, Sections: {}, Tasks: {}",
                        report.projects.upserted, report.sections.upserted, report.tasks.upserted
                    );
                }
                SyncMode::Incremental => {
                    println!("✓ Sync complete - {} change(s)", report.total_changes());
                    for (name, counts) in [
                        ("Projects", report.projects),
                        ("Sections", report.sections),
                        ("Tasks", report.tasks),
                    ] {
                        if counts.upserted + counts.deleted > 0 {
                            println!(
                                "  {}: {} updated, {} deleted",
                                name, counts.upserted, counts.deleted
                            );
                        }
                    }
                }
            },
            OutputFormat::Json => print_json(report),
            OutputFormat::Quiet => {}
        }
    }

    pub fn print_status(&self, status: &SyncStatus, counts: &CacheCounts, config: &Config) {
        match self.format {
            OutputFormat::Json => print_json(&serde_json::json!({
                "sync": status,
                "counts": counts,
                "cache_enabled": config.cache_enabled,
                "background_sync": config.background_sync,
                "api_url": config.api_url,
                "cache_path": config.cache_path(),
            })),
            OutputFormat::Quiet => println!("{}", status.current_token),
            OutputFormat::Human => {
                println!("todosync Status");
                println!("===============");
                println!();
                println!("Sync:");
                println!(
                    "  Bootstrapped: {}",
                    if status.bootstrap_done { "yes" } else { "no" }
                );
                match status.last_sync_time {
                    Some(time) => println!("  Last sync:    {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
                    None => println!("  Last sync:    never"),
                }
                println!("  Token:        {}", status.current_token);
                println!(
                    "  Background:   {}",
                    if config.background_sync {
                        format!("every {}s", config.sync_interval_secs)
                    } else {
                        "disabled".to_string()
                    }
                );
                println!();
                println!("Cache:");
                println!(
                    "  Status:   {}",
                    if config.cache_enabled { "enabled" } else { "disabled" }
                );
                println!("  Location: {}", config.cache_path().display());
                println!();
                println!("Contents:");
                println!("  Projects: {}", counts.projects);
                println!("  Sections: {}", counts.sections);
                println!("  Tasks:    {}", counts.tasks);
            }
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print a warning to stderr; shown in every mode
    pub fn warning(&self, message: &str) {
        eprintln!("⚠ {}", message);
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// One-line task summary
fn task_line(task: &Task) -> String {
    let marker = if task.is_completed() { "✓" } else { " " };
    let mut line = format!(
        "{:<12} {} p{} {}",
        task.id,
        marker,
        task.priority,
        truncate(&task.content, 50)
    );
    if !task.labels.is_empty() {
        line.push_str(&format!(" @{}", task.labels.join(" @")));
    }
    if let Some(due) = due_text(task) {
        line.push_str(&format!(" (due {})", due));
    }
    line
}

/// Structured date when known, else the phrase the user typed
fn due_text(task: &Task) -> Option<String> {
    let due = task.due.as_ref()?;
    match due.naive_date() {
        Some(date) => Some(date.format("%Y-%m-%d").to_string()),
        None if !due.string.is_empty() => Some(due.string.clone()),
        None => None,
    }
}

/// Truncate a string to max characters, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use todosync_core::models::Due;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        assert_eq!(truncate("ünïcödé strings", 8), "ünïcö...");
    }

    #[test]
    fn test_due_text_prefers_date() {
        let mut task = Task::new("1", "p", "Pay rent");
        assert!(due_text(&task).is_none());

        task.due = Some(Due {
            string: "every 1st".to_string(),
            date: "2025-03-01".to_string(),
            is_recurring: true,
        });
        assert_eq!(due_text(&task).as_deref(), Some("2025-03-01"));

        task.due = Some(Due {
            string: "tomorrow".to_string(),
            date: String::new(),
            is_recurring: false,
        });
        assert_eq!(due_text(&task).as_deref(), Some("tomorrow"));
    }

    #[test]
    fn test_task_line() {
        let mut task = Task::new("42", "p", "Water plants");
        task.priority = 3;
        task.labels = vec!["home".to_string(), "daily".to_string()];

        let line = task_line(&task);
        assert!(line.starts_with("42"));
        assert!(line.contains("p3 Water plants"));
        assert!(line.contains("@home @daily"));
        assert!(!line.contains('✓'));

        task.completed_at = Some(chrono::Utc::now());
        assert!(task_line(&task).contains('✓'));
    }
}
