//! SQLite storage for the tracker.
//!
//! `TrackerDb` owns the connection and exposes CRUD per entity; the
//! per-entity methods live in the sibling modules as further `impl TrackerDb`
//! blocks. Request handlers go through [`DbHandle`].

mod activity;
mod attachments;
mod issues;
mod projects;
mod tags;
mod users;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};

/// Shared tracker database for request handlers.
///
/// Every handler closure runs on the blocking pool with the connection
/// locked, one at a time.
#[derive(Clone)]
pub struct DbHandle {
    db: Arc<Mutex<TrackerDb>>,
}

fn poisoned<T>(_: PoisonError<T>) -> anyhow::Error {
    anyhow::anyhow!("Tracker database lock poisoned")
}

impl DbHandle {
    pub fn new(db: TrackerDb) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` against the locked database. Captures must be owned.
    pub async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&TrackerDb) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&*db.lock().map_err(poisoned)?))
            .await
            .context("Tracker database task failed")?
    }

    /// Lock from synchronous code: CLI setup and test fixtures.
    pub fn lock_sync(&self) -> Result<MutexGuard<'_, TrackerDb>> {
        self.db.lock().map_err(poisoned)
    }
}

pub struct TrackerDb {
    conn: Connection,
}

impl TrackerDb {
    /// Open (or create) a SQLite database at the given path and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Create an in-memory SQLite database (for testing).
    pub fn new_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        self.conn
            .execute_batch("PRAGMA foreign_keys = ON;")
            .context("Failed to enable foreign keys")?;
        self.run_migrations().context("Failed to run migrations")?;
        self.seed_default_tags().context("Failed to seed default tags")?;
        Ok(())
    }

    fn run_migrations(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    email TEXT NOT NULL,
                    firstname TEXT NOT NULL DEFAULT '',
                    lastname TEXT NOT NULL DEFAULT '',
                    role_id INTEGER NOT NULL DEFAULT 1,
                    private INTEGER NOT NULL DEFAULT 0,
                    password TEXT NOT NULL,
                    status INTEGER NOT NULL DEFAULT 1,
                    language TEXT NOT NULL DEFAULT 'en',
                    deleted INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS projects (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    private INTEGER NOT NULL DEFAULT 0,
                    status INTEGER NOT NULL DEFAULT 1,
                    default_assignee INTEGER,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS projects_users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    message_id INTEGER NOT NULL DEFAULT 1,
                    UNIQUE(user_id, project_id)
                );

                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    parent_id INTEGER NOT NULL DEFAULT 0,
                    name TEXT NOT NULL,
                    bgcolor TEXT NOT NULL DEFAULT '',
                    is_group INTEGER NOT NULL DEFAULT 0,
                    role_limit INTEGER
                );

                CREATE TABLE IF NOT EXISTS projects_kanban_tags (
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL DEFAULT 0,
                    PRIMARY KEY (project_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS projects_issues (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL DEFAULT '',
                    created_by INTEGER NOT NULL,
                    updated_by INTEGER,
                    assigned_to INTEGER,
                    time_quote INTEGER NOT NULL DEFAULT 0,
                    lock_quote INTEGER NOT NULL DEFAULT 0,
                    status INTEGER NOT NULL DEFAULT 1,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS projects_issues_tags (
                    issue_id INTEGER NOT NULL REFERENCES projects_issues(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
                    PRIMARY KEY (issue_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS projects_issues_comments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                    issue_id INTEGER NOT NULL REFERENCES projects_issues(id) ON DELETE CASCADE,
                    created_by INTEGER NOT NULL,
                    comment TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS projects_issues_attachments (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    project_id INTEGER NOT NULL,
                    issue_id INTEGER REFERENCES projects_issues(id) ON DELETE CASCADE,
                    comment_id INTEGER REFERENCES projects_issues_comments(id) ON DELETE SET NULL,
                    uploaded_by INTEGER NOT NULL,
                    filename TEXT NOT NULL,
                    fileextension TEXT NOT NULL DEFAULT '',
                    filesize INTEGER NOT NULL DEFAULT 0,
                    upload_token TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE TABLE IF NOT EXISTS users_activity (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    type_id INTEGER NOT NULL,
                    parent_id INTEGER NOT NULL,
                    user_id INTEGER NOT NULL,
                    item_id INTEGER NOT NULL,
                    action_id INTEGER,
                    data TEXT,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
                );

                CREATE UNIQUE INDEX IF NOT EXISTS idx_users_email ON users(email);
                CREATE INDEX IF NOT EXISTS idx_projects_users_user ON projects_users(user_id);
                CREATE INDEX IF NOT EXISTS idx_issues_project ON projects_issues(project_id);
                CREATE INDEX IF NOT EXISTS idx_comments_issue ON projects_issues_comments(issue_id);
                CREATE INDEX IF NOT EXISTS idx_attachments_token ON projects_issues_attachments(upload_token, uploaded_by);
                CREATE INDEX IF NOT EXISTS idx_activity_parent ON users_activity(parent_id);
                ",
            )
            .context("Failed to create tables")?;
        Ok(())
    }

    /// Insert the default status/type/resolution groups on an empty database.
    fn seed_default_tags(&self) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .context("Failed to count tags")?;
        if count > 0 {
            return Ok(());
        }

        let defaults: [(&str, &[(&str, &str)]); 3] = [
            (
                "status",
                &[
                    ("open", "#c43c35"),
                    ("closed", "#46a546"),
                    ("testing", "#f89406"),
                    ("in progress", "#62cffc"),
                ],
            ),
            ("type", &[("bug", "#c43c35"), ("feature", "#62cffc")]),
            (
                "resolution",
                &[
                    ("fixed", "#46a546"),
                    ("won't fix", "#999999"),
                    ("duplicate", "#999999"),
                ],
            ),
        ];

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        for (group, tags) in defaults {
            tx.execute(
                "INSERT INTO tags (parent_id, name, bgcolor, is_group) VALUES (0, ?1, '', 1)",
                params![group],
            )
            .with_context(|| format!("Failed to insert tag group {}", group))?;
            let group_id = tx.last_insert_rowid();
            for (name, color) in tags {
                tx.execute(
                    "INSERT INTO tags (parent_id, name, bgcolor, is_group) VALUES (?1, ?2, ?3, 0)",
                    params![group_id, name, color],
                )
                .with_context(|| format!("Failed to insert tag {}", name))?;
            }
        }
        tx.commit().context("Failed to commit default tags")?;
        Ok(())
    }
}

/// Map an out-of-range integer column into a rusqlite conversion error.
fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Integer,
        message.into(),
    )
}
