use anyhow::{Context, Result};
use rusqlite::{Row, Transaction, params};

use super::TrackerDb;
use crate::tracker::models::*;

const PROJECT_COLUMNS: &str = "id, name, private, status, default_assignee, created_at, updated_at";

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        private: row.get(2)?,
        status: ProjectStatus::from_id(row.get(3)?),
        default_assignee: row.get::<_, Option<i64>>(4)?.filter(|id| *id > 0),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn replace_kanban_tags(tx: &Transaction<'_>, project_id: i64, tag_ids: &[i64]) -> Result<()> {
    tx.execute(
        "DELETE FROM projects_kanban_tags WHERE project_id = ?1",
        params![project_id],
    )
    .context("Failed to clear kanban columns")?;
    for (position, tag_id) in tag_ids.iter().enumerate() {
        tx.execute(
            "INSERT OR IGNORE INTO projects_kanban_tags (project_id, tag_id, position) VALUES (?1, ?2, ?3)",
            params![project_id, tag_id, position as i64],
        )
        .context("Failed to insert kanban column")?;
    }
    Ok(())
}

impl TrackerDb {
    // ── Project CRUD ──────────────────────────────────────────────────

    pub fn create_project(&self, info: &NewProject) -> Result<Project> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO projects (name, private, default_assignee) VALUES (?1, ?2, ?3)",
            params![info.name, info.private, info.default_assignee],
        )
        .context("Failed to insert project")?;
        let id = tx.last_insert_rowid();
        for user_id in &info.user_ids {
            tx.execute(
                "INSERT OR IGNORE INTO projects_users (user_id, project_id) VALUES (?1, ?2)",
                params![user_id, id],
            )
            .context("Failed to assign user to project")?;
        }
        replace_kanban_tags(&tx, id, &info.kanban_tag_ids)?;
        tx.commit().context("Failed to commit project insert")?;
        self.get_project(id)?.context("Project not found after insert")
    }

    pub fn list_projects(&self) -> Result<Vec<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM projects ORDER BY name", PROJECT_COLUMNS))
            .context("Failed to prepare list_projects")?;
        let rows = stmt
            .query_map([], project_from_row)
            .context("Failed to query projects")?;
        let mut projects = Vec::new();
        for row in rows {
            projects.push(row.context("Failed to read project row")?);
        }
        Ok(projects)
    }

    pub fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM projects WHERE id = ?1", PROJECT_COLUMNS))
            .context("Failed to prepare get_project")?;
        let mut rows = stmt
            .query_map(params![id], project_from_row)
            .context("Failed to query project")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read project row")?)),
            None => Ok(None),
        }
    }

    pub fn update_project(&self, id: i64, info: &ProjectUpdate) -> Result<Project> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(name) = &info.name {
            tx.execute(
                "UPDATE projects SET name = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![name, id],
            )
            .context("Failed to update project name")?;
        }
        if let Some(private) = info.private {
            tx.execute(
                "UPDATE projects SET private = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![private, id],
            )
            .context("Failed to update project visibility")?;
        }
        if let Some(status) = info.status {
            tx.execute(
                "UPDATE projects SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.id(), id],
            )
            .context("Failed to update project status")?;
        }
        if let Some(default_assignee) = info.default_assignee {
            tx.execute(
                "UPDATE projects SET default_assignee = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![default_assignee, id],
            )
            .context("Failed to update project default assignee")?;
        }
        if let Some(tag_ids) = &info.kanban_tag_ids {
            replace_kanban_tags(&tx, id, tag_ids)?;
        }

        tx.commit().context("Failed to commit project update")?;
        self.get_project(id)?.context("Project not found after update")
    }

    /// Delete a project; issues, comments, memberships and kanban columns
    /// cascade.
    pub fn delete_project(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM projects WHERE id = ?1", params![id])
            .context("Failed to delete project")?;
        Ok(count > 0)
    }

    /// Tag ids chosen as kanban columns, in board order.
    pub fn kanban_tag_ids(&self, project_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT tag_id FROM projects_kanban_tags WHERE project_id = ?1 ORDER BY position",
            )
            .context("Failed to prepare kanban_tag_ids")?;
        let rows = stmt
            .query_map(params![project_id], |row| row.get::<_, i64>(0))
            .context("Failed to query kanban columns")?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(row.context("Failed to read kanban column")?);
        }
        Ok(ids)
    }
}
