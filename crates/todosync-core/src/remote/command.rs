//! Write commands sent in a sync request
//!
//! Each command carries a unique `uuid` (the key of its entry in the
//! response's `sync_status`). Commands that create an entity also carry a
//! `temp_id`, which the service maps to the canonical id in
//! `temp_id_mapping`.

use serde::Serialize;
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::models::{NewProject, NewSection, NewTask, ProjectUpdate, TaskUpdate};

/// Command names understood by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    ItemAdd,
    ItemUpdate,
    ItemDelete,
    ItemClose,
    ItemUncomplete,
    ProjectAdd,
    ProjectUpdate,
    ProjectDelete,
    SectionAdd,
    SectionDelete,
}

impl CommandType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandType::ItemAdd => "item_add",
            CommandType::ItemUpdate => "item_update",
            CommandType::ItemDelete => "item_delete",
            CommandType::ItemClose => "item_close",
            CommandType::ItemUncomplete => "item_uncomplete",
            CommandType::ProjectAdd => "project_add",
            CommandType::ProjectUpdate => "project_update",
            CommandType::ProjectDelete => "project_delete",
            CommandType::SectionAdd => "section_add",
            CommandType::SectionDelete => "section_delete",
        }
    }
}

/// One write command
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Command {
    #[serde(rename = "type")]
    pub kind: CommandType,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    pub args: Value,
}

impl Command {
    fn new(kind: CommandType, args: Value) -> Self {
        Self {
            kind,
            uuid: Uuid::new_v4().to_string(),
            temp_id: None,
            args,
        }
    }

    fn creating(kind: CommandType, args: Value) -> Self {
        Self {
            temp_id: Some(Uuid::new_v4().to_string()),
            ..Self::new(kind, args)
        }
    }

    fn by_id(kind: CommandType, id: &str) -> Self {
        Self::new(kind, json!({ "id": id }))
    }

    pub fn item_add(task: &NewTask) -> Self {
        let mut args = Map::new();
        args.insert("content".into(), json!(task.content));
        if let Some(ref description) = task.description {
            args.insert("description".into(), json!(description));
        }
        if let Some(ref project_id) = task.project_id {
            args.insert("project_id".into(), json!(project_id));
        }
        if let Some(ref section_id) = task.section_id {
            args.insert("section_id".into(), json!(section_id));
        }
        if let Some(priority) = task.priority {
            args.insert("priority".into(), json!(priority));
        }
        if !task.labels.is_empty() {
            args.insert("labels".into(), json!(task.labels));
        }
        if let Some(ref due) = task.due_string {
            args.insert("due".into(), json!({ "string": due }));
        }
        Self::creating(CommandType::ItemAdd, Value::Object(args))
    }

    pub fn item_update(id: &str, update: &TaskUpdate) -> Self {
        let mut args = Map::new();
        args.insert("id".into(), json!(id));
        if let Some(ref content) = update.content {
            args.insert("content".into(), json!(content));
        }
        if let Some(ref description) = update.description {
            args.insert("description".into(), json!(description));
        }
        if let Some(priority) = update.priority {
            args.insert("priority".into(), json!(priority));
        }
        if let Some(ref labels) = update.labels {
            args.insert("labels".into(), json!(labels));
        }
        if let Some(ref due) = update.due_string {
            let value = if due.trim().is_empty() {
                Value::Null
            } else {
                json!({ "string": due })
            };
            args.insert("due".into(), value);
        }
        Self::new(CommandType::ItemUpdate, Value::Object(args))
    }

    pub fn item_delete(id: &str) -> Self {
        Self::by_id(CommandType::ItemDelete, id)
    }

    pub fn item_close(id: &str) -> Self {
        Self::by_id(CommandType::ItemClose, id)
    }

    pub fn item_uncomplete(id: &str) -> Self {
        Self::by_id(CommandType::ItemUncomplete, id)
    }

    pub fn project_add(project: &NewProject) -> Self {
        let mut args = Map::new();
        args.insert("name".into(), json!(project.name));
        if let Some(ref color) = project.color {
            args.insert("color".into(), json!(color));
        }
        if let Some(ref parent_id) = project.parent_id {
            args.insert("parent_id".into(), json!(parent_id));
        }
        if project.is_favorite {
            args.insert("is_favorite".into(), json!(true));
        }
        Self::creating(CommandType::ProjectAdd, Value::Object(args))
    }

    pub fn project_update(id: &str, update: &ProjectUpdate) -> Self {
        let mut args = Map::new();
        args.insert("id".into(), json!(id));
        if let Some(ref name) = update.name {
            args.insert("name".into(), json!(name));
        }
        if let Some(ref color) = update.color {
            args.insert("color".into(), json!(color));
        }
        if let Some(is_favorite) = update.is_favorite {
            args.insert("is_favorite".into(), json!(is_favorite));
        }
        Self::new(CommandType::ProjectUpdate, Value::Object(args))
    }

    pub fn project_delete(id: &str) -> Self {
        Self::by_id(CommandType::ProjectDelete, id)
    }

    pub fn section_add(section: &NewSection) -> Self {
        Self::creating(
            CommandType::SectionAdd,
            json!({ "name": section.name, "project_id": section.project_id }),
        )
    }

    pub fn section_delete(id: &str) -> Self {
        Self::by_id(CommandType::SectionDelete, id)
    }
}
