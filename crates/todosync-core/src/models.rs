//! Data models for todosync
//!
//! Defines the cached entities (Project, Section, Task), the write inputs
//! sent to the remote service, and the sync bookkeeping types.
//! Entity ids are assigned by the server and treated as opaque strings.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Token value that requests a full snapshot from the remote
pub const FULL_SYNC_TOKEN: &str = "*";

/// Lowest (default) task priority
pub const MIN_PRIORITY: u8 = 1;

/// Highest task priority
pub const MAX_PRIORITY: u8 = 4;

/// A project; projects form a tree through `parent_id`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    /// Server-assigned identifier
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Color name as reported by the server
    #[serde(default)]
    pub color: String,
    /// Parent project, if nested
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub shared: bool,
    /// The user's default project for new tasks
    #[serde(default)]
    pub inbox_project: bool,
}

impl Project {
    /// Create a project with default flags
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            color: String::from("charcoal"),
            parent_id: None,
            is_archived: false,
            is_favorite: false,
            shared: false,
            inbox_project: false,
        }
    }
}

/// A section inside a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub section_order: i64,
}

impl Section {
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            name: name.into(),
            section_order: 0,
        }
    }
}

/// Due descriptor: the human phrase plus the structured date
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Due {
    /// Free text as typed by the user ("every monday")
    #[serde(default)]
    pub string: String,
    /// `YYYY-MM-DD`, optionally followed by a time component
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub is_recurring: bool,
}

impl Due {
    /// Parse the calendar date part, ignoring any time component
    pub fn naive_date(&self) -> Option<NaiveDate> {
        let day = self.date.get(..10)?;
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
    }
}

/// A task (called an "item" on the wire)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    /// Parent task for sub-tasks
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub description: String,
    /// 1 (normal) to 4 (urgent)
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Labels in display order
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub due: Option<Due>,
    /// None while the task is active
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub added_at: DateTime<Utc>,
}

fn default_priority() -> u8 {
    MIN_PRIORITY
}

impl Task {
    /// Create an active task with default priority
    pub fn new(
        id: impl Into<String>,
        project_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            project_id: project_id.into(),
            section_id: None,
            parent_id: None,
            content: content.into(),
            description: String::new(),
            priority: MIN_PRIORITY,
            labels: Vec::new(),
            due: None,
            completed_at: None,
            added_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Apply a partial update in place
    pub fn apply_update(&mut self, update: &TaskUpdate) {
        if let Some(ref content) = update.content {
            self.content = content.clone();
        }
        if let Some(ref description) = update.description {
            self.description = description.clone();
        }
        if let Some(priority) = update.priority {
            self.priority = priority;
        }
        if let Some(ref labels) = update.labels {
            self.labels = labels.clone();
        }
        if let Some(ref due_string) = update.due_string {
            self.due = due_from_string(due_string);
        }
    }
}

/// Build a provisional due descriptor from user text.
///
/// The structured date stays empty until the server's version of the task
/// arrives with the next sync.
pub(crate) fn due_from_string(text: &str) -> Option<Due> {
    if text.trim().is_empty() {
        return None;
    }
    Some(Due {
        string: text.to_string(),
        date: String::new(),
        is_recurring: false,
    })
}

/// Filter for task listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskFilter {
    /// Restrict to one project
    pub project_id: Option<String>,
    /// Only tasks carrying this label
    pub label: Option<String>,
    /// Include completed tasks (excluded by default)
    pub include_completed: bool,
}

impl TaskFilter {
    pub fn matches(&self, task: &Task) -> bool {
        if !self.include_completed && task.is_completed() {
            return false;
        }
        if let Some(ref project_id) = self.project_id {
            if &task.project_id != project_id {
                return false;
            }
        }
        if let Some(ref label) = self.label {
            if !task.labels.iter().any(|l| l.eq_ignore_ascii_case(label)) {
                return false;
            }
        }
        true
    }
}

// ==================== Write Inputs ====================

/// Input for creating a task
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub content: String,
    pub description: Option<String>,
    /// None means the inbox project
    pub project_id: Option<String>,
    pub section_id: Option<String>,
    pub priority: Option<u8>,
    pub labels: Vec<String>,
    pub due_string: Option<String>,
}

impl NewTask {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Partial task update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    pub content: Option<String>,
    pub description: Option<String>,
    pub priority: Option<u8>,
    pub labels: Option<Vec<String>>,
    /// Empty string clears the due date
    pub due_string: Option<String>,
}

impl TaskUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.description.is_none()
            && self.priority.is_none()
            && self.labels.is_none()
            && self.due_string.is_none()
    }
}

/// Input for creating a project
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub color: Option<String>,
    pub parent_id: Option<String>,
    pub is_favorite: bool,
}

impl NewProject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Partial project update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_favorite: Option<bool>,
}

impl ProjectUpdate {
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(ref name) = self.name {
            project.name = name.clone();
        }
        if let Some(ref color) = self.color {
            project.color = color.clone();
        }
        if let Some(is_favorite) = self.is_favorite {
            project.is_favorite = is_favorite;
        }
    }
}

/// Input for creating a section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSection {
    pub name: String,
    pub project_id: String,
}

// ==================== Sync Bookkeeping ====================

/// Snapshot of the sync metadata singleton
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SyncStatus {
    /// A full sync has committed at least once
    pub bootstrap_done: bool,
    /// None until the first successful sync
    pub last_sync_time: Option<DateTime<Utc>>,
    /// `"*"` until the first successful sync
    pub current_token: String,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            bootstrap_done: false,
            last_sync_time: None,
            current_token: FULL_SYNC_TOKEN.to_string(),
        }
    }
}

/// How a sync call ended up touching the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Cache replaced by a full snapshot
    Full,
    /// Delta applied on top of the cache
    Incremental,
    /// Empty delta; nothing written
    NoChanges,
}

/// Per-table change counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChangeCounts {
    pub upserted: usize,
    pub deleted: usize,
}

/// Outcome of one committed (or skipped) sync
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub projects: ChangeCounts,
    pub sections: ChangeCounts,
    pub tasks: ChangeCounts,
    /// Token stored after the sync
    pub token: String,
}

impl SyncReport {
    pub fn total_changes(&self) -> usize {
        [self.projects, self.sections, self.tasks]
            .iter()
            .map(|c| c.upserted + c.deleted)
            .sum()
    }
}

/// Row counts per cached table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounts {
    pub projects: i64,
    pub sections: i64,
    pub tasks: i64,
}

// ==================== Project Tree ====================

/// Names from the root project down to `id`.
///
/// Stops at a missing parent or at the first repeated id, so a corrupted
/// (cyclic) tree still terminates.
pub fn project_path(projects: &[Project], id: &str) -> Vec<String> {
    let by_id: HashMap<&str, &Project> = projects.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    let mut current = by_id.get(id).copied();

    while let Some(project) = current {
        if !seen.insert(project.id.as_str()) {
            break;
        }
        names.push(project.name.clone());
        current = project
            .parent_id
            .as_deref()
            .and_then(|parent| by_id.get(parent).copied());
    }

    names.reverse();
    names
}
