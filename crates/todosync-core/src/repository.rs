//! Repository facade
//!
//! The one object the command layer talks to. Reads are served from the
//! local cache (or straight from the remote when caching is disabled);
//! writes go to the remote first and are mirrored into the cache once the
//! remote has confirmed them.
//!
//! ## Usage
//!
//! ```ignore
//! let mut repo = Repository::open(config)?;
//! repo.initialize(&cancel).await?;
//!
//! let tasks = repo.get_tasks(&TaskFilter::default(), &cancel).await?;
//! let created = repo.create_task(&NewTask::new("Buy milk"), &cancel).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;
use crate::models::{
    project_path, CacheCounts, NewProject, NewSection, NewTask, Project, ProjectUpdate, Section,
    SyncReport, SyncStatus, Task, TaskFilter, TaskUpdate, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::remote::{
    Command, HttpRemote, RemoteClient, RemoteError, ResourceType, Row, SyncRequest, SyncResponse,
};
use crate::storage::{CacheStore, SqliteCache, StorageError, StorageResult};
use crate::sync::{
    call_remote, spawn_background_sync, BackgroundSyncHandle, Cancellation, SyncEngine,
    SyncError,
};

/// Errors surfaced by the repository
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The remote failed or refused; nothing was changed locally
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("{phase} failed: {source}")]
    Storage {
        phase: &'static str,
        #[source]
        source: StorageError,
    },

    /// No entity matched a user-supplied reference
    #[error("No {kind} matches '{query}'")]
    NotFound { kind: &'static str, query: String },

    /// Rejected before contacting the remote
    #[error("Invalid input: {0}")]
    Invalid(String),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<SyncError> for RepositoryError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Remote(e) => RepositoryError::Remote(e),
            SyncError::Storage { phase, source } => RepositoryError::Storage { phase, source },
            SyncError::Cancelled => RepositoryError::Cancelled,
        }
    }
}

impl RepositoryError {
    fn storage(phase: &'static str, source: StorageError) -> Self {
        RepositoryError::Storage { phase, source }
    }

    fn not_found(kind: &'static str, query: &str) -> Self {
        RepositoryError::NotFound {
            kind,
            query: query.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result of a confirmed write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome<T> {
    pub value: T,
    /// Set when the remote accepted the write but the cache mirror failed;
    /// the next sync repairs the cache
    pub warning: Option<String>,
}

impl<T> WriteOutcome<T> {
    fn new(value: T, warning: Option<String>) -> Self {
        Self { value, warning }
    }
}

type StoreFactory<S> = Box<dyn Fn() -> StorageResult<S> + Send + Sync>;

/// Local-first reads, remote-first writes
pub struct Repository<R, S> {
    config: Config,
    engine: SyncEngine<R, S>,
    /// Opens the background syncer's own store connection
    background_store: Option<StoreFactory<S>>,
    background: Option<BackgroundSyncHandle>,
}

impl Repository<Arc<HttpRemote>, SqliteCache> {
    /// Open the production repository: HTTP remote plus the SQLite cache in
    /// the configured data directory
    pub fn open(config: Config) -> RepositoryResult<Self> {
        let remote = Arc::new(HttpRemote::from_config(&config)?);
        let store = SqliteCache::open_with_config(&config)
            .map_err(|e| RepositoryError::storage("open cache", e))?;

        let background_config = config.clone();
        Ok(Self::new(config, remote, store)
            .with_background_store(move || SqliteCache::open_with_config(&background_config)))
    }
}

impl<R, S> Repository<R, S>
where
    R: RemoteClient + Clone + 'static,
    S: CacheStore + 'static,
{
    pub fn new(config: Config, remote: R, store: S) -> Self {
        let engine = SyncEngine::new(remote, store, &config);
        Self {
            config,
            engine,
            background_store: None,
            background: None,
        }
    }

    /// Allow `initialize` to spawn the background syncer with stores from
    /// `factory`
    pub fn with_background_store<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> StorageResult<S> + Send + Sync + 'static,
    {
        self.background_store = Some(Box::new(factory));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bootstrap the cache if it never was, then start background sync
    /// when enabled.
    ///
    /// Returns the report of the bootstrap, if one ran.
    pub async fn initialize(
        &mut self,
        cancel: &Cancellation,
    ) -> RepositoryResult<Option<SyncReport>> {
        let mut report = None;
        if self.config.cache_enabled {
            let done = self
                .engine
                .store()
                .is_initial_sync_done()
                .map_err(|e| RepositoryError::storage("read sync status", e))?;
            if !done {
                report = Some(self.engine.initial_sync(cancel).await?);
            }
        }

        if self.config.cache_enabled && self.config.background_sync && self.background.is_none()
        {
            self.start_background_sync()?;
        }

        Ok(report)
    }

    fn start_background_sync(&mut self) -> RepositoryResult<()> {
        let Some(factory) = self.background_store.as_ref() else {
            warn!("Background sync enabled but no store available for it");
            return Ok(());
        };

        let store = factory().map_err(|e| RepositoryError::storage("open background cache", e))?;
        let engine = SyncEngine::new(self.engine.remote().clone(), store, &self.config);
        self.background = Some(spawn_background_sync(engine, self.config.sync_interval()));
        Ok(())
    }

    /// Handle of the running background syncer, if any
    pub fn background(&mut self) -> Option<&mut BackgroundSyncHandle> {
        self.background.as_mut()
    }

    /// Stop background sync and close the cache; safe to call twice
    pub async fn close(&mut self) -> RepositoryResult<()> {
        if let Some(handle) = self.background.take() {
            handle.shutdown().await;
        }
        self.engine
            .store_mut()
            .close()
            .map_err(|e| RepositoryError::storage("close cache", e))
    }

    // ==================== Sync ====================

    /// Incremental sync (bootstraps first if needed)
    pub async fn sync(&mut self, cancel: &Cancellation) -> RepositoryResult<SyncReport> {
        Ok(self.engine.incremental_sync(cancel).await?)
    }

    pub async fn force_initial_sync(
        &mut self,
        cancel: &Cancellation,
    ) -> RepositoryResult<SyncReport> {
        Ok(self.engine.force_initial_sync(cancel).await?)
    }

    pub fn sync_status(&self) -> RepositoryResult<SyncStatus> {
        Ok(self.engine.sync_status()?)
    }

    /// Drop every cached row and the sync metadata
    pub fn reset_cache(&mut self) -> RepositoryResult<()> {
        info!("Resetting local cache");
        self.engine
            .store_mut()
            .reset()
            .map_err(|e| RepositoryError::storage("reset cache", e))
    }

    /// Row counts per cached table
    pub fn cache_counts(&self) -> RepositoryResult<CacheCounts> {
        self.engine
            .store()
            .counts()
            .map_err(|e| RepositoryError::storage("count rows", e))
    }

    // ==================== Reads ====================

    pub async fn get_all_projects(&self, cancel: &Cancellation) -> RepositoryResult<Vec<Project>> {
        if self.config.cache_enabled {
            return self
                .engine
                .store()
                .get_all_projects()
                .map_err(|e| RepositoryError::storage("list projects", e));
        }
        let response = self.fetch(ResourceType::Projects, cancel).await?;
        Ok(live(response.projects))
    }

    pub async fn get_project(
        &self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<Option<Project>> {
        if self.config.cache_enabled {
            return self
                .engine
                .store()
                .get_project(id)
                .map_err(|e| RepositoryError::storage("get project", e));
        }
        let projects = self.get_all_projects(cancel).await?;
        Ok(projects.into_iter().find(|p| p.id == id))
    }

    pub async fn get_all_sections(&self, cancel: &Cancellation) -> RepositoryResult<Vec<Section>> {
        if self.config.cache_enabled {
            return self
                .engine
                .store()
                .get_all_sections()
                .map_err(|e| RepositoryError::storage("list sections", e));
        }
        let response = self.fetch(ResourceType::Sections, cancel).await?;
        Ok(live(response.sections))
    }

    /// Sections of one project
    pub async fn get_sections(
        &self,
        project_id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<Vec<Section>> {
        if self.config.cache_enabled {
            return self
                .engine
                .store()
                .get_sections_by_project(project_id)
                .map_err(|e| RepositoryError::storage("list sections", e));
        }
        let mut sections = self.get_all_sections(cancel).await?;
        sections.retain(|s| s.project_id == project_id);
        Ok(sections)
    }

    pub async fn get_tasks(
        &self,
        filter: &TaskFilter,
        cancel: &Cancellation,
    ) -> RepositoryResult<Vec<Task>> {
        if self.config.cache_enabled {
            return self
                .engine
                .store()
                .get_tasks(filter)
                .map_err(|e| RepositoryError::storage("list tasks", e));
        }
        let response = self.fetch(ResourceType::Items, cancel).await?;
        let mut tasks: Vec<Task> = live(response.items)
            .into_iter()
            .filter(|t| filter.matches(t))
            .collect();
        // Same order as the cache
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.added_at.cmp(&b.added_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(tasks)
    }

    pub async fn get_task(&self, id: &str, cancel: &Cancellation) -> RepositoryResult<Option<Task>> {
        if self.config.cache_enabled {
            return self
                .engine
                .store()
                .get_task(id)
                .map_err(|e| RepositoryError::storage("get task", e));
        }
        let response = self.fetch(ResourceType::Items, cancel).await?;
        Ok(live(response.items).into_iter().find(|t| t.id == id))
    }

    /// Resolve a user-supplied project reference to an id.
    ///
    /// Case-insensitive; an exact name wins over an exact id, which wins
    /// over a name substring.
    pub async fn find_project_id_by_name(
        &self,
        text: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<String> {
        let projects = self.get_all_projects(cancel).await?;
        resolve_project(&projects, text)
            .map(|p| p.id.clone())
            .ok_or_else(|| RepositoryError::not_found("project", text))
    }

    /// Names from the root project down to `id`
    pub async fn project_path(
        &self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<Vec<String>> {
        let projects = self.get_all_projects(cancel).await?;
        let path = project_path(&projects, id);
        if path.is_empty() {
            return Err(RepositoryError::not_found("project", id));
        }
        Ok(path)
    }

    async fn fetch(
        &self,
        resource: ResourceType,
        cancel: &Cancellation,
    ) -> RepositoryResult<SyncResponse> {
        let request = SyncRequest::full(&[resource]);
        Ok(call_remote(self.engine.remote(), request, cancel, self.timeout()).await?)
    }

    fn timeout(&self) -> Duration {
        self.engine.request_timeout()
    }

    // ==================== Writes ====================

    pub async fn create_project(
        &mut self,
        new: &NewProject,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<Project>> {
        require_text("project name", &new.name)?;

        let command = Command::project_add(new);
        let response = self.execute(&command, cancel).await?;
        let id = created_id(&response, &command)?;

        let mut project = Project::new(id, new.name.clone());
        project.parent_id = new.parent_id.clone();
        project.is_favorite = new.is_favorite;
        if let Some(ref color) = new.color {
            project.color = color.clone();
        }

        let warning = self.mirror("create project", |store| store.upsert_project(&project));
        info!("Created project {} ({})", project.name, project.id);
        Ok(WriteOutcome::new(project, warning))
    }

    pub async fn update_project(
        &mut self,
        id: &str,
        update: &ProjectUpdate,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        if let Some(ref name) = update.name {
            require_text("project name", name)?;
        }

        self.execute(&Command::project_update(id, update), cancel)
            .await?;

        let warning = self.mirror("update project", |store| {
            if let Some(mut project) = store.get_project(id)? {
                update.apply_to(&mut project);
                store.upsert_project(&project)?;
            }
            Ok(())
        });
        Ok(WriteOutcome::new((), warning))
    }

    /// Delete a project along with its cached sections and tasks
    pub async fn delete_project(
        &mut self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        self.execute(&Command::project_delete(id), cancel).await?;

        let warning = self.mirror("delete project", |store| {
            let filter = TaskFilter {
                project_id: Some(id.to_string()),
                include_completed: true,
                ..Default::default()
            };
            for task in store.get_tasks(&filter)? {
                store.delete_task(&task.id)?;
            }
            for section in store.get_sections_by_project(id)? {
                store.delete_section(&section.id)?;
            }
            store.delete_project(id)?;
            Ok(())
        });
        info!("Deleted project {}", id);
        Ok(WriteOutcome::new((), warning))
    }

    pub async fn create_section(
        &mut self,
        new: &NewSection,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<Section>> {
        require_text("section name", &new.name)?;

        let command = Command::section_add(new);
        let response = self.execute(&command, cancel).await?;
        let id = created_id(&response, &command)?;

        let section = Section::new(id, new.project_id.clone(), new.name.clone());
        let warning = self.mirror("create section", |store| store.upsert_section(&section));
        Ok(WriteOutcome::new(section, warning))
    }

    pub async fn delete_section(
        &mut self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        self.execute(&Command::section_delete(id), cancel).await?;
        let warning = self.mirror("delete section", |store| store.delete_section(id).map(|_| ()));
        Ok(WriteOutcome::new((), warning))
    }

    pub async fn create_task(
        &mut self,
        new: &NewTask,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<Task>> {
        require_text("task content", &new.content)?;
        if let Some(priority) = new.priority {
            check_priority(priority)?;
        }

        let command = Command::item_add(new);
        let response = self.execute(&command, cancel).await?;
        let id = created_id(&response, &command)?;

        // Without a project the server files the task in the inbox
        let project_id = match new.project_id {
            Some(ref project_id) => project_id.clone(),
            None => self.inbox_project_id().unwrap_or_default(),
        };

        let mut task = Task::new(id, project_id, new.content.clone());
        task.section_id = new.section_id.clone();
        task.description = new.description.clone().unwrap_or_default();
        task.priority = new.priority.unwrap_or(MIN_PRIORITY);
        task.labels = new.labels.clone();
        task.apply_update(&TaskUpdate {
            due_string: new.due_string.clone(),
            ..Default::default()
        });

        let warning = self.mirror("create task", |store| store.upsert_task(&task));
        info!("Created task {}", task.id);
        Ok(WriteOutcome::new(task, warning))
    }

    pub async fn update_task(
        &mut self,
        id: &str,
        update: &TaskUpdate,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        if update.is_empty() {
            return Err(RepositoryError::Invalid("nothing to update".to_string()));
        }
        if let Some(ref content) = update.content {
            require_text("task content", content)?;
        }
        if let Some(priority) = update.priority {
            check_priority(priority)?;
        }

        self.execute(&Command::item_update(id, update), cancel)
            .await?;

        let warning = self.mirror("update task", |store| {
            if let Some(mut task) = store.get_task(id)? {
                task.apply_update(update);
                store.upsert_task(&task)?;
            }
            Ok(())
        });
        Ok(WriteOutcome::new((), warning))
    }

    pub async fn delete_task(
        &mut self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        self.execute(&Command::item_delete(id), cancel).await?;
        let warning = self.mirror("delete task", |store| store.delete_task(id).map(|_| ()));
        Ok(WriteOutcome::new((), warning))
    }

    /// Mark a task completed
    pub async fn close_task(
        &mut self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        self.execute(&Command::item_close(id), cancel).await?;
        let warning = self.mirror("close task", |store| {
            if let Some(mut task) = store.get_task(id)? {
                // Recurring tasks move to their next date instead of completing
                if task.due.as_ref().is_some_and(|due| due.is_recurring) {
                    return Ok(());
                }
                task.completed_at = Some(Utc::now());
                store.upsert_task(&task)?;
            }
            Ok(())
        });
        Ok(WriteOutcome::new((), warning))
    }

    /// Mark a completed task active again
    pub async fn reopen_task(
        &mut self,
        id: &str,
        cancel: &Cancellation,
    ) -> RepositoryResult<WriteOutcome<()>> {
        self.execute(&Command::item_uncomplete(id), cancel).await?;
        let warning = self.mirror("reopen task", |store| {
            if let Some(mut task) = store.get_task(id)? {
                task.completed_at = None;
                store.upsert_task(&task)?;
            }
            Ok(())
        });
        Ok(WriteOutcome::new((), warning))
    }

    /// Send one command and require it to be acknowledged
    async fn execute(
        &self,
        command: &Command,
        cancel: &Cancellation,
    ) -> RepositoryResult<SyncResponse> {
        let commands = vec![command.clone()];
        let request = SyncRequest::write(commands);
        let response = call_remote(self.engine.remote(), request, cancel, self.timeout()).await?;
        response.ensure_commands_ok(std::slice::from_ref(command))?;
        Ok(response)
    }

    /// Apply a confirmed write to the cache; failure only produces a warning
    fn mirror<F>(&mut self, operation: &str, f: F) -> Option<String>
    where
        F: FnOnce(&mut S) -> StorageResult<()>,
    {
        if !self.config.cache_enabled {
            return None;
        }
        let result = f(self.engine.store_mut());
        // The background syncer picks up anything the mirror missed
        if let Some(ref handle) = self.background {
            handle.trigger();
        }
        match result {
            Ok(()) => None,
            Err(e) => {
                warn!("{} succeeded remotely but the cache was not updated: {}", operation, e);
                Some(format!(
                    "{} succeeded, but the local cache could not be updated ({}); run sync to repair it",
                    operation, e
                ))
            }
        }
    }

    fn inbox_project_id(&self) -> Option<String> {
        if !self.config.cache_enabled {
            return None;
        }
        let projects = self.engine.store().get_all_projects().ok()?;
        projects.into_iter().find(|p| p.inbox_project).map(|p| p.id)
    }
}

fn live<T>(rows: Vec<Row<T>>) -> Vec<T> {
    rows.into_iter()
        .filter(|row| !row.is_deleted)
        .map(|row| row.entity)
        .collect()
}

/// Canonical id the remote assigned to a create command
fn created_id(response: &SyncResponse, command: &Command) -> RepositoryResult<String> {
    command
        .temp_id
        .as_deref()
        .and_then(|temp_id| response.canonical_id(temp_id))
        .map(str::to_string)
        .ok_or_else(|| {
            RepositoryError::Remote(RemoteError::Decode(format!(
                "no id returned for {} command",
                command.kind.as_str()
            )))
        })
}

fn require_text(what: &str, value: &str) -> RepositoryResult<()> {
    if value.trim().is_empty() {
        return Err(RepositoryError::Invalid(format!("{} cannot be empty", what)));
    }
    Ok(())
}

fn check_priority(priority: u8) -> RepositoryResult<()> {
    if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        return Err(RepositoryError::Invalid(format!(
            "priority must be between {} and {}, got {}",
            MIN_PRIORITY, MAX_PRIORITY, priority
        )));
    }
    Ok(())
}

/// Exact name, then exact id, then name substring; all case-insensitive
fn resolve_project<'a>(projects: &'a [Project], text: &str) -> Option<&'a Project> {
    let query = text.trim();
    if query.is_empty() {
        return None;
    }
    let lower = query.to_lowercase();

    projects
        .iter()
        .find(|p| p.name.to_lowercase() == lower)
        .or_else(|| projects.iter().find(|p| p.id.eq_ignore_ascii_case(query)))
        .or_else(|| {
            projects
                .iter()
                .find(|p| p.name.to_lowercase().contains(&lower))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Due;
    use crate::remote::{CommandType, ALL_RESOURCES};
    use crate::sync::{cancellation, SyncEvent};
    use crate::test_support::{bootstrap_snapshot, project, response, task, FakeRemote};

    type TestRepo = Repository<Arc<FakeRemote>, SqliteCache>;

    fn config() -> Config {
        Config {
            api_token: Some("test".to_string()),
            ..Config::default()
        }
    }

    fn repo_with(config: Config) -> (TestRepo, Arc<FakeRemote>) {
        let remote = Arc::new(FakeRemote::new());
        let store = SqliteCache::open_in_memory().unwrap();
        (Repository::new(config, Arc::clone(&remote), store), remote)
    }

    /// Repository bootstrapped from the standard snapshot
    async fn ready() -> (TestRepo, Arc<FakeRemote>) {
        let (mut repo, remote) = repo_with(config());
        remote.push_response(bootstrap_snapshot("T1"));
        repo.initialize(&Cancellation::never()).await.unwrap();
        (repo, remote)
    }

    fn cached_task(repo: &TestRepo, id: &str) -> Option<Task> {
        repo.engine.store().get_task(id).unwrap()
    }

    #[tokio::test]
    async fn test_open_without_token_serves_local_commands() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = Config {
            data_dir: dir.path().to_path_buf(),
            api_token: None,
            ..Config::default()
        };
        let mut repo = Repository::open(config).unwrap();

        assert_eq!(repo.sync_status().unwrap(), SyncStatus::default());
        repo.reset_cache().unwrap();

        let err = repo.sync(&Cancellation::never()).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Remote(RemoteError::NotConfigured(_))
        ));
        repo.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_bootstraps_once() {
        let (mut repo, remote) = repo_with(config());
        remote.push_response(bootstrap_snapshot("T1"));
        let cancel = Cancellation::never();

        let report = repo.initialize(&cancel).await.unwrap();
        assert!(report.is_some());
        assert_eq!(repo.get_all_projects(&cancel).await.unwrap().len(), 2);

        let again = repo.initialize(&cancel).await.unwrap();
        assert!(again.is_none());
        assert_eq!(remote.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_initialize_without_cache_skips_bootstrap() {
        let (mut repo, remote) = repo_with(Config {
            cache_enabled: false,
            ..config()
        });

        assert!(repo
            .initialize(&Cancellation::never())
            .await
            .unwrap()
            .is_none());
        assert!(remote.requests().is_empty());
    }

    #[tokio::test]
    async fn test_reads_without_cache_go_to_remote() {
        let (repo, remote) = repo_with(Config {
            cache_enabled: false,
            ..config()
        });
        remote.push_response(SyncResponse {
            projects: vec![project("p1", "Inbox"), Row::deleted(Project::new("p2", ""))],
            ..response("T1", true)
        });

        let projects = repo.get_all_projects(&Cancellation::never()).await.unwrap();

        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].id, "p1");
        let request = &remote.requests()[0];
        assert!(request.is_full());
        assert_eq!(request.resource_types, vec![ResourceType::Projects]);
        // The cache was not written
        assert!(repo.engine.store().get_all_projects().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remote_task_reads_filter_and_sort() {
        let (repo, remote) = repo_with(Config {
            cache_enabled: false,
            ..config()
        });
        let mut urgent = task("t2", "p1", "Urgent");
        urgent.entity.priority = 4;
        let mut done = task("t3", "p1", "Done");
        done.entity.completed_at = Some(Utc::now());
        remote.push_response(SyncResponse {
            items: vec![task("t1", "p1", "Normal"), urgent, done],
            ..response("T1", true)
        });

        let tasks = repo
            .get_tasks(&TaskFilter::default(), &Cancellation::never())
            .await
            .unwrap();

        let ids: Vec<_> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
    }

    #[tokio::test]
    async fn test_create_task_uses_canonical_id() {
        let (mut repo, remote) = ready().await;
        remote.push_ack(&["t100"]);

        let mut new = NewTask::new("Call the plumber");
        new.project_id = Some("p2".to_string());
        new.priority = Some(3);
        new.labels = vec!["home".to_string()];
        let outcome = repo
            .create_task(&new, &Cancellation::never())
            .await
            .unwrap();

        assert!(outcome.warning.is_none());
        assert_eq!(outcome.value.id, "t100");
        let cached = cached_task(&repo, "t100").unwrap();
        assert_eq!(cached.content, "Call the plumber");
        assert_eq!(cached.project_id, "p2");
        assert_eq!(cached.priority, 3);

        let request = &remote.requests()[1];
        assert!(request.resource_types.is_empty());
        assert_eq!(request.commands.len(), 1);
        assert_eq!(request.commands[0].kind, CommandType::ItemAdd);
        // The temp id never reaches the cache
        let temp_id = request.commands[0].temp_id.clone().unwrap();
        assert!(cached_task(&repo, &temp_id).is_none());
    }

    #[tokio::test]
    async fn test_create_task_defaults_to_inbox() {
        let (mut repo, remote) = repo_with(config());
        let mut snapshot = bootstrap_snapshot("T1");
        snapshot.projects[0].entity.inbox_project = true;
        remote.push_response(snapshot);
        repo.initialize(&Cancellation::never()).await.unwrap();
        remote.push_ack(&["t100"]);

        let outcome = repo
            .create_task(&NewTask::new("Anything"), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(outcome.value.project_id, "p1");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_cache_untouched() {
        let (mut repo, remote) = ready().await;
        remote.push_error(RemoteError::Rejected {
            status: 403,
            message: "forbidden".to_string(),
        });

        let err = repo
            .delete_task("t1", &Cancellation::never())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Remote(RemoteError::Rejected { status: 403, .. })
        ));
        assert!(cached_task(&repo, "t1").is_some());
    }

    #[tokio::test]
    async fn test_unacknowledged_command_is_an_error() {
        let (mut repo, remote) = ready().await;
        remote.push_response(response("W", false));

        let err = repo
            .close_task("t1", &Cancellation::never())
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Remote(RemoteError::Decode(_))));
        assert!(!cached_task(&repo, "t1").unwrap().is_completed());
    }

    #[tokio::test]
    async fn test_mirror_failure_is_a_warning() {
        let (mut repo, remote) = ready().await;
        repo.engine.store_mut().close().unwrap();
        remote.push_ack(&["t100"]);

        let outcome = repo
            .create_task(&NewTask::new("Still created"), &Cancellation::never())
            .await
            .unwrap();

        assert_eq!(outcome.value.id, "t100");
        let warning = outcome.warning.unwrap();
        assert!(warning.contains("create task"));
        assert!(warning.contains("run sync"));
    }

    #[tokio::test]
    async fn test_close_and_reopen_task() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();

        remote.push_ack(&[]);
        repo.close_task("t1", &cancel).await.unwrap();
        assert!(cached_task(&repo, "t1").unwrap().is_completed());
        let active = repo.get_tasks(&TaskFilter::default(), &cancel).await.unwrap();
        assert!(active.iter().all(|t| t.id != "t1"));

        remote.push_ack(&[]);
        repo.reopen_task("t1", &cancel).await.unwrap();
        assert!(!cached_task(&repo, "t1").unwrap().is_completed());

        let kinds: Vec<_> = remote.requests()[1..]
            .iter()
            .map(|r| r.commands[0].kind)
            .collect();
        assert_eq!(kinds, vec![CommandType::ItemClose, CommandType::ItemUncomplete]);
    }

    #[tokio::test]
    async fn test_close_recurring_task_stays_active() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();

        let mut recurring = cached_task(&repo, "t2").unwrap();
        recurring.due = Some(Due {
            string: "every monday".to_string(),
            date: "2024-01-15".to_string(),
            is_recurring: true,
        });
        repo.engine.store_mut().upsert_task(&recurring).unwrap();

        remote.push_ack(&[]);
        let outcome = repo.close_task("t2", &cancel).await.unwrap();
        assert!(outcome.warning.is_none());
        assert!(!cached_task(&repo, "t2").unwrap().is_completed());

        let active = repo.get_tasks(&TaskFilter::default(), &cancel).await.unwrap();
        assert!(active.iter().any(|t| t.id == "t2"));
    }

    #[tokio::test]
    async fn test_update_and_delete_task() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();

        remote.push_ack(&[]);
        let update = TaskUpdate {
            content: Some("Buy oat milk".to_string()),
            priority: Some(2),
            ..Default::default()
        };
        repo.update_task("t1", &update, &cancel).await.unwrap();
        let updated = repo.get_task("t1", &cancel).await.unwrap().unwrap();
        assert_eq!(updated.content, "Buy oat milk");
        assert_eq!(updated.priority, 2);

        remote.push_ack(&[]);
        repo.delete_task("t1", &cancel).await.unwrap();
        assert!(repo.get_task("t1", &cancel).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_input_never_reaches_remote() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();

        let mut new = NewTask::new("Too urgent");
        new.priority = Some(9);
        assert!(matches!(
            repo.create_task(&new, &cancel).await,
            Err(RepositoryError::Invalid(_))
        ));
        assert!(matches!(
            repo.create_task(&NewTask::new("  "), &cancel).await,
            Err(RepositoryError::Invalid(_))
        ));
        assert!(matches!(
            repo.update_task("t1", &TaskUpdate::default(), &cancel).await,
            Err(RepositoryError::Invalid(_))
        ));
        assert_eq!(remote.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_project_and_section_writes() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();

        remote.push_ack(&["p10"]);
        let mut new = NewProject::new("Garden");
        new.parent_id = Some("p1".to_string());
        let created = repo.create_project(&new, &cancel).await.unwrap().value;
        assert_eq!(created.id, "p10");
        assert_eq!(
            repo.project_path("p10", &cancel).await.unwrap(),
            vec!["Inbox", "Garden"]
        );

        remote.push_ack(&[]);
        let rename = ProjectUpdate {
            name: Some("Yard".to_string()),
            ..Default::default()
        };
        repo.update_project("p10", &rename, &cancel).await.unwrap();
        assert_eq!(
            repo.get_project("p10", &cancel).await.unwrap().unwrap().name,
            "Yard"
        );

        remote.push_ack(&["s10"]);
        let section = NewSection {
            name: "Beds".to_string(),
            project_id: "p10".to_string(),
        };
        repo.create_section(&section, &cancel).await.unwrap();
        assert_eq!(repo.get_sections("p10", &cancel).await.unwrap().len(), 1);

        remote.push_ack(&[]);
        repo.delete_section("s10", &cancel).await.unwrap();
        assert!(repo.get_sections("p10", &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_project_removes_children() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();
        remote.push_ack(&[]);

        repo.delete_project("p2", &cancel).await.unwrap();

        assert!(repo.get_project("p2", &cancel).await.unwrap().is_none());
        assert!(repo.get_sections("p2", &cancel).await.unwrap().is_empty());
        let counts = repo.cache_counts().unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.sections, 0);
        assert_eq!(counts.tasks, 1);
    }

    #[tokio::test]
    async fn test_find_project_precedence() {
        let (mut repo, remote) = repo_with(config());
        remote.push_response(SyncResponse {
            projects: vec![
                project("p1", "Homework"),
                project("p2", "Work"),
                project("home", "Chores"),
            ],
            ..response("T1", true)
        });
        let cancel = Cancellation::never();
        repo.initialize(&cancel).await.unwrap();

        // Exact name beats the substring hit in "Homework"
        assert_eq!(repo.find_project_id_by_name("WORK", &cancel).await.unwrap(), "p2");
        // Exact id beats the substring hit in "Homework"
        assert_eq!(repo.find_project_id_by_name("Home", &cancel).await.unwrap(), "home");
        assert_eq!(repo.find_project_id_by_name("mewo", &cancel).await.unwrap(), "p1");

        match repo.find_project_id_by_name("garden", &cancel).await {
            Err(RepositoryError::NotFound { kind, query }) => {
                assert_eq!(kind, "project");
                assert_eq!(query, "garden");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(repo.find_project_id_by_name("", &cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_sync_and_status() {
        let (mut repo, remote) = ready().await;
        let cancel = Cancellation::never();
        remote.push_response(SyncResponse {
            items: vec![task("t4", "p1", "New")],
            ..response("T2", false)
        });

        let report = repo.sync(&cancel).await.unwrap();
        assert_eq!(report.token, "T2");
        let status = repo.sync_status().unwrap();
        assert!(status.bootstrap_done);
        assert_eq!(status.current_token, "T2");
        assert_eq!(remote.requests()[1].resource_types, ALL_RESOURCES.to_vec());
    }

    #[tokio::test]
    async fn test_sync_storage_error_keeps_phase() {
        let (mut repo, remote) = ready().await;
        let mut bad = task("t5", "p1", "Bad");
        bad.entity.priority = 7;
        remote.push_response(SyncResponse {
            items: vec![bad],
            ..response("T2", false)
        });

        let err = repo.sync(&Cancellation::never()).await.unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::Storage {
                phase: "incremental sync",
                ..
            }
        ));
        assert_eq!(repo.sync_status().unwrap().current_token, "T1");
    }

    #[tokio::test]
    async fn test_cancelled_write() {
        let (mut repo, remote) = ready().await;
        remote.push_ack(&["t100"]);
        let (handle, cancel) = cancellation();
        handle.cancel();

        let err = repo
            .create_task(&NewTask::new("Never"), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Cancelled));
        assert_eq!(remote.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_cache() {
        let (mut repo, _remote) = ready().await;

        repo.reset_cache().unwrap();

        assert_eq!(repo.sync_status().unwrap(), SyncStatus::default());
        assert_eq!(repo.cache_counts().unwrap().tasks, 0);
    }

    #[tokio::test]
    async fn test_background_sync_lifecycle() {
        let remote = Arc::new(FakeRemote::new());
        remote.push_response(bootstrap_snapshot("T1"));
        let config = Config {
            background_sync: true,
            ..config()
        };
        let mut repo = Repository::new(
            config,
            Arc::clone(&remote),
            SqliteCache::open_in_memory().unwrap(),
        )
        .with_background_store(SqliteCache::open_in_memory);

        repo.initialize(&Cancellation::never()).await.unwrap();
        assert!(repo.background().unwrap().is_running());

        let mut events = repo.background().unwrap().take_events().unwrap();

        // A confirmed write asks the background syncer to catch up
        remote.push_ack(&[]);
        remote.push_response(bootstrap_snapshot("T2"));
        repo.close_task("t1", &Cancellation::never()).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SyncEvent::Synced(report) => assert_eq!(report.token, "T2"),
            SyncEvent::Failed(e) => panic!("background sync failed: {}", e),
        }
        assert_eq!(remote.requests().len(), 3);

        repo.close().await.unwrap();
        assert!(repo.background().is_none());
        // Closing twice is fine
        repo.close().await.unwrap();
    }
}
