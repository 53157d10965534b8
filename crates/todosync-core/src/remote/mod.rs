//! Remote sync service interface
//!
//! The service exposes one call: send a cursor token, the resource types
//! of interest and an optional batch of write commands; receive a new
//! token plus every changed entity since the given token.
//!
//! ## Protocol
//!
//! 1. Token `"*"` returns a full snapshot (`full_sync = true`)
//! 2. Any other token returns only rows changed since then
//! 3. Deleted entities come back with `is_deleted = true`
//! 4. Created entities are reported in `temp_id_mapping`
//!
//! ## Usage
//!
//! ```ignore
//! let remote = HttpRemote::from_config(&config)?;
//! let response = remote.sync(SyncRequest::full(&ALL_RESOURCES)).await?;
//! ```

mod command;
mod error;
mod http;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::models::{Project, Section, Task, FULL_SYNC_TOKEN};

pub use command::{Command, CommandType};
pub use error::{RemoteError, RemoteResult};
pub use http::HttpRemote;

/// Resource types tracked by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Projects,
    Sections,
    Items,
}

/// Every tracked resource type; always requested together so one token
/// covers all of them
pub const ALL_RESOURCES: [ResourceType; 3] = [
    ResourceType::Projects,
    ResourceType::Sections,
    ResourceType::Items,
];

/// A sync call
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    pub sync_token: String,
    pub resource_types: Vec<ResourceType>,
    pub commands: Vec<Command>,
}

impl SyncRequest {
    /// Request a full snapshot of the given resources
    pub fn full(resource_types: &[ResourceType]) -> Self {
        Self {
            sync_token: FULL_SYNC_TOKEN.to_string(),
            resource_types: resource_types.to_vec(),
            commands: Vec::new(),
        }
    }

    /// Request changes since `token`
    pub fn since(token: impl Into<String>, resource_types: &[ResourceType]) -> Self {
        Self {
            sync_token: token.into(),
            resource_types: resource_types.to_vec(),
            commands: Vec::new(),
        }
    }

    /// Send write commands without reading any resources
    pub fn write(commands: Vec<Command>) -> Self {
        Self {
            sync_token: FULL_SYNC_TOKEN.to_string(),
            resource_types: Vec::new(),
            commands,
        }
    }

    pub fn is_full(&self) -> bool {
        self.sync_token == FULL_SYNC_TOKEN
    }
}

/// An entity row in a sync response, possibly a tombstone
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Row<T> {
    #[serde(flatten)]
    pub entity: T,
    #[serde(default)]
    pub is_deleted: bool,
}

impl<T> Row<T> {
    pub fn live(entity: T) -> Self {
        Self {
            entity,
            is_deleted: false,
        }
    }

    pub fn deleted(entity: T) -> Self {
        Self {
            entity,
            is_deleted: true,
        }
    }
}

/// Result of one command, keyed by command uuid in `sync_status`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CommandStatus {
    /// Always the string `"ok"`
    Ok(String),
    Error {
        error: String,
        #[serde(default)]
        error_code: Option<i64>,
    },
}

impl CommandStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, CommandStatus::Ok(s) if s == "ok")
    }
}

/// Response to a sync call
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SyncResponse {
    /// Cursor covering everything in this response
    pub sync_token: String,
    /// True when the rows are a complete snapshot
    #[serde(default)]
    pub full_sync: bool,
    #[serde(default)]
    pub projects: Vec<Row<Project>>,
    #[serde(default)]
    pub sections: Vec<Row<Section>>,
    /// Tasks
    #[serde(default)]
    pub items: Vec<Row<Task>>,
    #[serde(default)]
    pub temp_id_mapping: HashMap<String, String>,
    #[serde(default)]
    pub sync_status: HashMap<String, CommandStatus>,
}

impl SyncResponse {
    /// No entity rows at all
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.sections.is_empty() && self.items.is_empty()
    }

    /// Server id for a temp id sent with a create command
    pub fn canonical_id(&self, temp_id: &str) -> Option<&str> {
        self.temp_id_mapping.get(temp_id).map(String::as_str)
    }

    /// Fail if any of `commands` was not acknowledged with "ok"
    pub fn ensure_commands_ok(&self, commands: &[Command]) -> RemoteResult<()> {
        for command in commands {
            match self.sync_status.get(&command.uuid) {
                Some(status) if status.is_ok() => {}
                Some(CommandStatus::Error { error, error_code }) => {
                    let message = match error_code {
                        Some(code) => format!("{} (code {})", error, code),
                        None => error.clone(),
                    };
                    return Err(RemoteError::CommandFailed {
                        command: command.kind.as_str().to_string(),
                        message,
                    });
                }
                Some(CommandStatus::Ok(other)) => {
                    return Err(RemoteError::CommandFailed {
                        command: command.kind.as_str().to_string(),
                        message: format!("unexpected status '{}'", other),
                    });
                }
                None => {
                    return Err(RemoteError::Decode(format!(
                        "no status reported for {} command",
                        command.kind.as_str()
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Client for the remote sync service
///
/// Implementations own the transport; callers only see requests and
/// responses. The returned future must be `Send` so engines can run on a
/// background task.
pub trait RemoteClient: Send + Sync {
    fn sync(
        &self,
        request: SyncRequest,
    ) -> impl Future<Output = RemoteResult<SyncResponse>> + Send;
}

impl<R: RemoteClient> RemoteClient for Arc<R> {
    fn sync(
        &self,
        request: SyncRequest,
    ) -> impl Future<Output = RemoteResult<SyncResponse>> + Send {
        (**self).sync(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_request() {
        let request = SyncRequest::full(&ALL_RESOURCES);
        assert!(request.is_full());
        assert_eq!(request.resource_types.len(), 3);
        assert!(request.commands.is_empty());
    }

    #[test]
    fn test_resource_type_serialization() {
        let json = serde_json::to_string(&ALL_RESOURCES).unwrap();
        assert_eq!(json, r#"["projects","sections","items"]"#);
    }

    #[test]
    fn test_response_deserialization() {
        let json = r#"{
            "sync_token": "T2",
            "full_sync": false,
            "projects": [{"id": "1", "name": "Inbox", "inbox_project": true}],
            "items": [
                {"id": "10", "project_id": "1", "content": "Call mom", "priority": 2,
                 "labels": ["family"], "due": {"string": "tomorrow", "date": "2024-06-02"},
                 "added_at": "2024-06-01T08:00:00Z"},
                {"id": "11", "is_deleted": true}
            ],
            "temp_id_mapping": {"tmp-1": "10"},
            "sync_status": {"cmd-1": "ok"}
        }"#;

        let response: SyncResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.sync_token, "T2");
        assert!(!response.full_sync);
        assert!(response.projects[0].entity.inbox_project);
        assert!(response.sections.is_empty());
        assert_eq!(response.items.len(), 2);
        assert!(!response.items[0].is_deleted);
        assert_eq!(response.items[0].entity.labels, vec!["family"]);
        assert!(response.items[1].is_deleted);
        assert_eq!(response.items[1].entity.id, "11");
        assert_eq!(response.canonical_id("tmp-1"), Some("10"));
        assert!(!response.is_empty());
    }

    #[test]
    fn test_ensure_commands_ok() {
        let ok = Command::item_close("1");
        let failed = Command::item_delete("2");

        let json = format!(
            r#"{{"sync_token": "T", "sync_status": {{
                "{}": "ok",
                "{}": {{"error": "Item not found", "error_code": 22}}
            }}}}"#,
            ok.uuid, failed.uuid
        );
        let response: SyncResponse = serde_json::from_str(&json).unwrap();

        assert!(response.ensure_commands_ok(&[ok.clone()]).is_ok());

        let err = response.ensure_commands_ok(&[ok, failed]).unwrap_err();
        match err {
            RemoteError::CommandFailed { command, message } => {
                assert_eq!(command, "item_delete");
                assert!(message.contains("Item not found"));
                assert!(message.contains("22"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_missing_command_status() {
        let response = SyncResponse::default();
        let err = response
            .ensure_commands_ok(&[Command::item_close("1")])
            .unwrap_err();
        assert!(matches!(err, RemoteError::Decode(_)));
    }
}
