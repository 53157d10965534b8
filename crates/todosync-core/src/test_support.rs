//! Scripted remote client and fixtures shared by unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use crate::models::{Project, Section, Task};
use crate::remote::{
    CommandStatus, RemoteClient, RemoteError, RemoteResult, Row, SyncRequest, SyncResponse,
};

/// What the fake answers to the next request
pub enum Reply {
    Response(SyncResponse),
    Error(RemoteError),
    /// Acknowledge every command; created entities get these ids in order
    Ack(Vec<String>),
}

/// Remote client that replays scripted replies and records requests
#[derive(Default)]
pub struct FakeRemote {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<SyncRequest>>,
    delay: Option<Duration>,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_response(&self, response: SyncResponse) {
        self.replies.lock().unwrap().push_back(Reply::Response(response));
    }

    pub fn push_error(&self, error: RemoteError) {
        self.replies.lock().unwrap().push_back(Reply::Error(error));
    }

    pub fn push_ack(&self, created_ids: &[&str]) {
        let ids = created_ids.iter().map(|s| s.to_string()).collect();
        self.replies.lock().unwrap().push_back(Reply::Ack(ids));
    }

    pub fn requests(&self) -> Vec<SyncRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl RemoteClient for FakeRemote {
    async fn sync(&self, request: SyncRequest) -> RemoteResult<SyncResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let reply = self.replies.lock().unwrap().pop_front();

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match reply {
            Some(Reply::Response(response)) => Ok(response),
            Some(Reply::Error(error)) => Err(error),
            Some(Reply::Ack(ids)) => {
                let mut ack = response("W", false);
                let mut ids = ids.into_iter();
                for command in &request.commands {
                    ack.sync_status
                        .insert(command.uuid.clone(), CommandStatus::Ok("ok".to_string()));
                    if let Some(ref temp_id) = command.temp_id {
                        if let Some(id) = ids.next() {
                            ack.temp_id_mapping.insert(temp_id.clone(), id);
                        }
                    }
                }
                Ok(ack)
            }
            None => Err(RemoteError::Unavailable("no scripted reply".to_string())),
        }
    }
}

/// Empty response carrying a token
pub fn response(token: &str, full_sync: bool) -> SyncResponse {
    SyncResponse {
        sync_token: token.to_string(),
        full_sync,
        ..Default::default()
    }
}

pub fn project(id: &str, name: &str) -> Row<Project> {
    Row::live(Project::new(id, name))
}

pub fn section(id: &str, project_id: &str, name: &str) -> Row<Section> {
    Row::live(Section::new(id, project_id, name))
}

pub fn task(id: &str, project_id: &str, content: &str) -> Row<Task> {
    let mut task = Task::new(id, project_id, content);
    task.added_at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    Row::live(task)
}

pub fn deleted_task(id: &str) -> Row<Task> {
    let mut row = task(id, "", "");
    row.is_deleted = true;
    row
}

/// Full snapshot with two projects and three tasks
pub fn bootstrap_snapshot(token: &str) -> SyncResponse {
    SyncResponse {
        projects: vec![project("p1", "Inbox"), project("p2", "Work")],
        sections: vec![section("s1", "p2", "Backlog")],
        items: vec![
            task("t1", "p1", "Buy milk"),
            task("t2", "p2", "Write report"),
            task("t3", "p2", "Review PR"),
        ],
        ..response(token, true)
    }
}
