//! SQLite implementation of the cache store
//!
//! ## Tables
//!
//! - `projects`, `sections`, `tasks` - one row per entity, keyed by id
//! - `sync_metadata` - singleton row (token, last sync time, bootstrap flag)
//!
//! Upserts use `INSERT OR REPLACE`. Transactions are plain
//! `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK` statements on the one
//! connection, with a flag to refuse nesting.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use tracing::{debug, warn};

use crate::config::Config;
use crate::models::{CacheCounts, Due, Project, Section, Task, TaskFilter, FULL_SYNC_TOKEN};
use crate::storage::cache_store::CacheStore;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::schema::{drop_schema, init_schema, needs_init};

/// How long a writer waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const PROJECT_COLUMNS: &str =
    "id, name, color, parent_id, is_archived, is_favorite, shared, inbox_project";

const SECTION_COLUMNS: &str = "id, project_id, name, section_order";

const TASK_COLUMNS: &str = "id, project_id, section_id, parent_id, content, description, \
     priority, labels, due_string, due_date, due_is_recurring, completed_at, added_at";

/// SQLite-backed local cache
pub struct SqliteCache {
    /// None once closed
    conn: Option<Connection>,
    in_tx: bool,
}

impl SqliteCache {
    /// Open or create the cache in the configured data directory
    pub fn open_with_config(config: &Config) -> StorageResult<Self> {
        let data_dir = &config.data_dir;
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir).map_err(|source| StorageError::CreateDirectory {
                path: data_dir.clone(),
                source,
            })?;
        }
        Self::open(&config.cache_path())
    }

    /// Open or create the cache at a specific path
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_connection(conn)
    }

    /// Open an in-memory cache (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StorageError::db("open", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StorageError::db("set busy timeout", e))?;

        if needs_init(&conn) {
            init_schema(&conn).map_err(|e| StorageError::db("initialize schema", e))?;
        }

        Ok(Self {
            conn: Some(conn),
            in_tx: false,
        })
    }

    fn conn(&self) -> StorageResult<&Connection> {
        self.conn.as_ref().ok_or(StorageError::Closed)
    }

    /// Make sure the metadata singleton exists before updating one column
    fn ensure_metadata_row(&self) -> StorageResult<()> {
        self.conn()?
            .execute("INSERT OR IGNORE INTO sync_metadata (id) VALUES (1)", [])
            .map_err(|e| StorageError::db("create sync metadata", e))?;
        Ok(())
    }

    fn query_projects(&self, sql: &str, args: &[&str]) -> StorageResult<Vec<Project>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StorageError::db("read projects", e))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    color: row.get(2)?,
                    parent_id: row.get(3)?,
                    is_archived: row.get(4)?,
                    is_favorite: row.get(5)?,
                    shared: row.get(6)?,
                    inbox_project: row.get(7)?,
                })
            })
            .map_err(|e| StorageError::db("read projects", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::db("read projects", e))
    }

    fn query_sections(&self, sql: &str, args: &[&str]) -> StorageResult<Vec<Section>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StorageError::db("read sections", e))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(Section {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    name: row.get(2)?,
                    section_order: row.get(3)?,
                })
            })
            .map_err(|e| StorageError::db("read sections", e))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| StorageError::db("read sections", e))
    }

    fn query_tasks(&self, sql: &str, args: &[&str]) -> StorageResult<Vec<Task>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| StorageError::db("read tasks", e))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(TaskRow {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    section_id: row.get(2)?,
                    parent_id: row.get(3)?,
                    content: row.get(4)?,
                    description: row.get(5)?,
                    priority: row.get(6)?,
                    labels: row.get(7)?,
                    due_string: row.get(8)?,
                    due_date: row.get(9)?,
                    due_is_recurring: row.get(10)?,
                    completed_at: row.get(11)?,
                    added_at: row.get(12)?,
                })
            })
            .map_err(|e| StorageError::db("read tasks", e))?;

        let mut tasks = Vec::new();
        for row in rows {
            let row = row.map_err(|e| StorageError::db("read tasks", e))?;
            tasks.push(row.hydrate()?);
        }
        Ok(tasks)
    }

    fn delete_by_id(
        &mut self,
        table: &'static str,
        operation: &'static str,
        id: &str,
    ) -> StorageResult<bool> {
        let removed = self
            .conn()?
            .execute(&format!("DELETE FROM {} WHERE id = ?1", table), params![id])
            .map_err(|e| StorageError::db_with_id(operation, id, e))?;
        Ok(removed > 0)
    }

    fn count(&self, table: &str) -> StorageResult<i64> {
        self.conn()?
            .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get(0)
            })
            .map_err(|e| StorageError::db("count rows", e))
    }
}

impl CacheStore for SqliteCache {
    fn upsert_project(&mut self, project: &Project) -> StorageResult<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO projects ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    PROJECT_COLUMNS
                ),
                params![
                    project.id,
                    project.name,
                    project.color,
                    project.parent_id,
                    project.is_archived,
                    project.is_favorite,
                    project.shared,
                    project.inbox_project,
                ],
            )
            .map_err(|e| StorageError::db_with_id("upsert project", &project.id, e))?;
        Ok(())
    }

    fn upsert_section(&mut self, section: &Section) -> StorageResult<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO sections ({}) VALUES (?1, ?2, ?3, ?4)",
                    SECTION_COLUMNS
                ),
                params![
                    section.id,
                    section.project_id,
                    section.name,
                    section.section_order,
                ],
            )
            .map_err(|e| StorageError::db_with_id("upsert section", &section.id, e))?;
        Ok(())
    }

    fn upsert_task(&mut self, task: &Task) -> StorageResult<()> {
        let labels = serde_json::to_string(&task.labels).map_err(|e| StorageError::Corrupt {
            table: "tasks",
            column: "labels",
            id: task.id.clone(),
            details: e.to_string(),
        })?;
        let due = task.due.as_ref();

        self.conn()?
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO tasks ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                    TASK_COLUMNS
                ),
                params![
                    task.id,
                    task.project_id,
                    task.section_id,
                    task.parent_id,
                    task.content,
                    task.description,
                    i64::from(task.priority),
                    labels,
                    due.map(|d| d.string.as_str()),
                    due.map(|d| d.date.as_str()),
                    due.map(|d| d.is_recurring).unwrap_or(false),
                    task.completed_at.map(|t| t.to_rfc3339()),
                    task.added_at.to_rfc3339(),
                ],
            )
            .map_err(|e| StorageError::db_with_id("upsert task", &task.id, e))?;
        Ok(())
    }

    fn delete_project(&mut self, id: &str) -> StorageResult<bool> {
        self.delete_by_id("projects", "delete project", id)
    }

    fn delete_section(&mut self, id: &str) -> StorageResult<bool> {
        self.delete_by_id("sections", "delete section", id)
    }

    fn delete_task(&mut self, id: &str) -> StorageResult<bool> {
        self.delete_by_id("tasks", "delete task", id)
    }

    fn clear_entities(&mut self) -> StorageResult<()> {
        self.conn()?
            .execute_batch("DELETE FROM tasks; DELETE FROM sections; DELETE FROM projects;")
            .map_err(|e| StorageError::db("clear cache", e))
    }

    fn get_all_projects(&self) -> StorageResult<Vec<Project>> {
        self.query_projects(
            &format!(
                "SELECT {} FROM projects ORDER BY name COLLATE NOCASE, id",
                PROJECT_COLUMNS
            ),
            &[],
        )
    }

    fn get_project(&self, id: &str) -> StorageResult<Option<Project>> {
        let mut found = self.query_projects(
            &format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS),
            &[id],
        )?;
        Ok(found.pop())
    }

    fn get_all_sections(&self) -> StorageResult<Vec<Section>> {
        self.query_sections(
            &format!(
                "SELECT {} FROM sections ORDER BY project_id, section_order, id",
                SECTION_COLUMNS
            ),
            &[],
        )
    }

    fn get_sections_by_project(&self, project_id: &str) -> StorageResult<Vec<Section>> {
        self.query_sections(
            &format!(
                "SELECT {} FROM sections WHERE project_id = ?1 ORDER BY section_order, id",
                SECTION_COLUMNS
            ),
            &[project_id],
        )
    }

    fn get_section(&self, id: &str) -> StorageResult<Option<Section>> {
        let mut found = self.query_sections(
            &format!("SELECT {} FROM sections WHERE id = ?1", SECTION_COLUMNS),
            &[id],
        )?;
        Ok(found.pop())
    }

    fn get_tasks(&self, filter: &TaskFilter) -> StorageResult<Vec<Task>> {
        let mut clauses = Vec::new();
        let mut args = Vec::new();

        if !filter.include_completed {
            clauses.push("completed_at IS NULL".to_string());
        }
        if let Some(ref project_id) = filter.project_id {
            args.push(project_id.as_str());
            clauses.push(format!("project_id = ?{}", args.len()));
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM tasks {} ORDER BY priority DESC, added_at, id",
            TASK_COLUMNS, where_clause
        );

        // Labels live in a JSON column; match them after decoding
        let tasks = self.query_tasks(&sql, &args)?;
        Ok(tasks.into_iter().filter(|t| filter.matches(t)).collect())
    }

    fn get_task(&self, id: &str) -> StorageResult<Option<Task>> {
        let mut found = self.query_tasks(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            &[id],
        )?;
        Ok(found.pop())
    }

    fn counts(&self) -> StorageResult<CacheCounts> {
        Ok(CacheCounts {
            projects: self.count("projects")?,
            sections: self.count("sections")?,
            tasks: self.count("tasks")?,
        })
    }

    fn sync_token(&self) -> StorageResult<String> {
        let token: Option<String> = self
            .conn()?
            .query_row(
                "SELECT sync_token FROM sync_metadata WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::db("read sync token", e))?;
        Ok(token.unwrap_or_else(|| FULL_SYNC_TOKEN.to_string()))
    }

    fn set_sync_token(&mut self, token: &str) -> StorageResult<()> {
        self.ensure_metadata_row()?;
        self.conn()?
            .execute(
                "UPDATE sync_metadata SET sync_token = ?1 WHERE id = 1",
                params![token],
            )
            .map_err(|e| StorageError::db("write sync token", e))?;
        Ok(())
    }

    fn last_sync_time(&self) -> StorageResult<Option<DateTime<Utc>>> {
        let raw: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT last_sync_time FROM sync_metadata WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::db("read last sync time", e))?;

        match raw.flatten() {
            Some(text) => parse_timestamp(&text, "sync_metadata", "last_sync_time", "1").map(Some),
            None => Ok(None),
        }
    }

    fn set_last_sync_time(&mut self, time: DateTime<Utc>) -> StorageResult<()> {
        self.ensure_metadata_row()?;
        self.conn()?
            .execute(
                "UPDATE sync_metadata SET last_sync_time = ?1 WHERE id = 1",
                params![time.to_rfc3339()],
            )
            .map_err(|e| StorageError::db("write last sync time", e))?;
        Ok(())
    }

    fn is_initial_sync_done(&self) -> StorageResult<bool> {
        let done: Option<bool> = self
            .conn()?
            .query_row(
                "SELECT initial_sync_done FROM sync_metadata WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StorageError::db("read bootstrap flag", e))?;
        Ok(done.unwrap_or(false))
    }

    fn set_initial_sync_done(&mut self, done: bool) -> StorageResult<()> {
        self.ensure_metadata_row()?;
        self.conn()?
            .execute(
                "UPDATE sync_metadata SET initial_sync_done = ?1 WHERE id = 1",
                params![done],
            )
            .map_err(|e| StorageError::db("write bootstrap flag", e))?;
        Ok(())
    }

    fn begin(&mut self) -> StorageResult<()> {
        if self.in_tx {
            return Err(StorageError::TransactionActive);
        }
        self.conn()?
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StorageError::db("begin transaction", e))?;
        self.in_tx = true;
        debug!("Cache transaction opened");
        Ok(())
    }

    fn commit(&mut self) -> StorageResult<()> {
        if !self.in_tx {
            return Err(StorageError::NoTransaction);
        }
        self.conn()?
            .execute_batch("COMMIT")
            .map_err(|e| StorageError::db("commit transaction", e))?;
        self.in_tx = false;
        debug!("Cache transaction committed");
        Ok(())
    }

    fn rollback(&mut self) -> StorageResult<()> {
        if !self.in_tx {
            return Err(StorageError::NoTransaction);
        }
        // The flag is cleared even if ROLLBACK fails: SQLite ends the
        // transaction on most errors that would make it fail
        self.in_tx = false;
        self.conn()?
            .execute_batch("ROLLBACK")
            .map_err(|e| StorageError::db("roll back transaction", e))?;
        debug!("Cache transaction rolled back");
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }

    fn reset(&mut self) -> StorageResult<()> {
        if self.in_tx {
            return Err(StorageError::TransactionActive);
        }
        let conn = self.conn()?;
        conn.execute_batch("BEGIN IMMEDIATE")
            .map_err(|e| StorageError::db("begin reset", e))?;

        // A failed rebuild must not leave the cache without tables
        let rebuilt = drop_schema(conn)
            .map_err(|e| StorageError::db("drop tables", e))
            .and_then(|_| init_schema(conn).map_err(|e| StorageError::db("initialize schema", e)));
        match rebuilt {
            Ok(()) => conn
                .execute_batch("COMMIT")
                .map_err(|e| StorageError::db("commit reset", e)),
            Err(e) => {
                if let Err(rollback_err) = conn.execute_batch("ROLLBACK") {
                    warn!("Failed to roll back cache reset: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    fn close(&mut self) -> StorageResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        if self.in_tx {
            self.in_tx = false;
            let _ = conn.execute_batch("ROLLBACK");
        }
        conn.close()
            .map_err(|(_, e)| StorageError::db("close cache", e))
    }
}

/// Raw task row before decoding JSON and timestamps
struct TaskRow {
    id: String,
    project_id: String,
    section_id: Option<String>,
    parent_id: Option<String>,
    content: String,
    description: String,
    priority: i64,
    labels: String,
    due_string: Option<String>,
    due_date: Option<String>,
    due_is_recurring: bool,
    completed_at: Option<String>,
    added_at: String,
}

impl TaskRow {
    fn hydrate(self) -> StorageResult<Task> {
        let labels: Vec<String> =
            serde_json::from_str(&self.labels).map_err(|e| StorageError::Corrupt {
                table: "tasks",
                column: "labels",
                id: self.id.clone(),
                details: e.to_string(),
            })?;

        let priority = u8::try_from(self.priority).map_err(|e| StorageError::Corrupt {
            table: "tasks",
            column: "priority",
            id: self.id.clone(),
            details: e.to_string(),
        })?;

        let due = match (self.due_string, self.due_date) {
            (None, None) => None,
            (string, date) => Some(Due {
                string: string.unwrap_or_default(),
                date: date.unwrap_or_default(),
                is_recurring: self.due_is_recurring,
            }),
        };

        let completed_at = match self.completed_at {
            Some(ref text) => Some(parse_timestamp(text, "tasks", "completed_at", &self.id)?),
            None => None,
        };
        let added_at = parse_timestamp(&self.added_at, "tasks", "added_at", &self.id)?;

        Ok(Task {
            id: self.id,
            project_id: self.project_id,
            section_id: self.section_id,
            parent_id: self.parent_id,
            content: self.content,
            description: self.description,
            priority,
            labels,
            due,
            completed_at,
            added_at,
        })
    }
}

fn parse_timestamp(
    text: &str,
    table: &'static str,
    column: &'static str,
    id: &str,
) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Corrupt {
            table,
            column,
            id: id.to_string(),
            details: e.to_string(),
        })
}
