use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde_json::json;

use super::TrackerDb;
use super::activity::insert_activity;
use super::tags::tag_from_row;
use crate::tracker::models::*;

const ISSUE_COLUMNS: &str = "id, project_id, title, body, created_by, updated_by, assigned_to, \
                             time_quote, lock_quote, status, created_at, updated_at";

fn issue_from_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        project_id: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        created_by: row.get(4)?,
        updated_by: row.get(5)?,
        assigned_to: row.get::<_, Option<i64>>(6)?.filter(|id| *id > 0),
        time_quote: row.get(7)?,
        lock_quote: row.get(8)?,
        status: IssueStatus::from_id(row.get(9)?),
        tags: Vec::new(),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn issue_tags(conn: &Connection, issue_id: i64) -> Result<Vec<Tag>> {
    let mut stmt = conn
        .prepare(
            "SELECT t.id, t.parent_id, t.name, t.bgcolor, t.is_group, t.role_limit
             FROM tags t JOIN projects_issues_tags it ON it.tag_id = t.id
             WHERE it.issue_id = ?1 ORDER BY t.parent_id, t.id",
        )
        .context("Failed to prepare issue_tags")?;
    let rows = stmt
        .query_map(params![issue_id], tag_from_row)
        .context("Failed to query issue tags")?;
    let mut tags = Vec::new();
    for row in rows {
        tags.push(row.context("Failed to read issue tag row")?);
    }
    Ok(tags)
}

/// Attach `tag_id` to the issue, replacing whatever tag of the same group
/// it had. Returns the replaced tag ids.
fn replace_group_tag(conn: &Connection, issue_id: i64, tag_id: i64) -> Result<Vec<i64>> {
    let parent_id: i64 = conn
        .query_row(
            "SELECT parent_id FROM tags WHERE id = ?1 AND is_group = 0",
            params![tag_id],
            |row| row.get(0),
        )
        .with_context(|| format!("Tag {} does not exist", tag_id))?;
    let removed = clear_group_tags(conn, issue_id, parent_id)?;
    conn.execute(
        "INSERT OR IGNORE INTO projects_issues_tags (issue_id, tag_id) VALUES (?1, ?2)",
        params![issue_id, tag_id],
    )
    .context("Failed to insert issue tag")?;
    Ok(removed.into_iter().filter(|id| *id != tag_id).collect())
}

fn clear_group_tags(conn: &Connection, issue_id: i64, group_id: i64) -> Result<Vec<i64>> {
    let mut stmt = conn
        .prepare(
            "SELECT it.tag_id FROM projects_issues_tags it JOIN tags t ON t.id = it.tag_id
             WHERE it.issue_id = ?1 AND t.parent_id = ?2",
        )
        .context("Failed to prepare clear_group_tags")?;
    let rows = stmt
        .query_map(params![issue_id, group_id], |row| row.get::<_, i64>(0))
        .context("Failed to query group tags")?;
    let mut removed = Vec::new();
    for row in rows {
        removed.push(row.context("Failed to read group tag")?);
    }
    for tag_id in &removed {
        conn.execute(
            "DELETE FROM projects_issues_tags WHERE issue_id = ?1 AND tag_id = ?2",
            params![issue_id, tag_id],
        )
        .context("Failed to delete issue tag")?;
    }
    Ok(removed)
}

/// The issue's open/closed status follows its status tag: `closed` closes
/// it, any other tag of the status group reopens it.
fn status_for_tags(conn: &Connection, tags: &[Tag], current: IssueStatus) -> Result<IssueStatus> {
    if tags.iter().any(|t| t.name == Tag::STATUS_CLOSED) {
        return Ok(IssueStatus::Closed);
    }
    let status_group: Option<i64> = conn
        .query_row(
            "SELECT id FROM tags WHERE is_group = 1 AND name = ?1",
            params![Tag::GROUP_STATUS],
            |row| row.get(0),
        )
        .optional()
        .context("Failed to look up status group")?;
    match status_group {
        Some(group_id) if tags.iter().any(|t| t.parent_id == group_id) => Ok(IssueStatus::Open),
        _ => Ok(current),
    }
}

impl TrackerDb {
    // ── Issue CRUD ────────────────────────────────────────────────────

    pub fn create_issue(&self, project_id: i64, user_id: i64, info: &NewIssue) -> Result<Issue> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO projects_issues (project_id, title, body, created_by, assigned_to, time_quote, lock_quote)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                project_id,
                info.title,
                info.body,
                user_id,
                info.assigned_to,
                info.time_quote,
                info.lock_quote
            ],
        )
        .context("Failed to insert issue")?;
        let id = tx.last_insert_rowid();
        for tag_id in &info.tag_ids {
            replace_group_tag(&tx, id, *tag_id)?;
        }
        insert_activity(
            &tx,
            &NewActivity {
                type_id: ActivityType::CreateIssue,
                parent_id: project_id,
                user_id,
                item_id: id,
                action_id: info.assigned_to,
                data: None,
            },
        )?;
        tx.commit().context("Failed to commit issue insert")?;
        self.get_issue(id)?.context("Issue not found after insert")
    }

    pub fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM projects_issues WHERE id = ?1",
                ISSUE_COLUMNS
            ))
            .context("Failed to prepare get_issue")?;
        let mut rows = stmt
            .query_map(params![id], issue_from_row)
            .context("Failed to query issue")?;
        match rows.next() {
            Some(row) => {
                let mut issue = row.context("Failed to read issue row")?;
                issue.tags = issue_tags(&self.conn, issue.id)?;
                Ok(Some(issue))
            }
            None => Ok(None),
        }
    }

    /// Apply an update made by `user_id`, logging reassignment, tag and
    /// open/closed transitions to the activity log.
    pub fn update_issue(&self, id: i64, user_id: i64, info: &IssueUpdate) -> Result<Issue> {
        let before = self
            .get_issue(id)?
            .with_context(|| format!("Issue {} not found", id))?;

        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(title) = &info.title {
            tx.execute(
                "UPDATE projects_issues SET title = ?1 WHERE id = ?2",
                params![title, id],
            )
            .context("Failed to update issue title")?;
        }
        if let Some(body) = &info.body {
            tx.execute(
                "UPDATE projects_issues SET body = ?1 WHERE id = ?2",
                params![body, id],
            )
            .context("Failed to update issue body")?;
        }
        if let Some(time_quote) = info.time_quote {
            tx.execute(
                "UPDATE projects_issues SET time_quote = ?1 WHERE id = ?2",
                params![time_quote, id],
            )
            .context("Failed to update issue quote")?;
        }
        if let Some(lock_quote) = info.lock_quote {
            tx.execute(
                "UPDATE projects_issues SET lock_quote = ?1 WHERE id = ?2",
                params![lock_quote, id],
            )
            .context("Failed to update quote lock")?;
        }
        if let Some(assigned_to) = info.assigned_to
            && assigned_to != before.assigned_to
        {
            tx.execute(
                "UPDATE projects_issues SET assigned_to = ?1 WHERE id = ?2",
                params![assigned_to, id],
            )
            .context("Failed to update issue assignee")?;
            insert_activity(
                &tx,
                &NewActivity {
                    type_id: ActivityType::ReassignIssue,
                    parent_id: before.project_id,
                    user_id,
                    item_id: id,
                    action_id: assigned_to,
                    data: None,
                },
            )?;
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        for tag_id in &info.tag_ids {
            if before.tags.iter().any(|t| t.id == *tag_id) {
                continue;
            }
            removed.extend(replace_group_tag(&tx, id, *tag_id)?);
            added.push(*tag_id);
        }
        for group_id in &info.cleared_groups {
            removed.extend(clear_group_tags(&tx, id, *group_id)?);
        }
        if !added.is_empty() || !removed.is_empty() {
            insert_activity(
                &tx,
                &NewActivity {
                    type_id: ActivityType::IssueTag,
                    parent_id: before.project_id,
                    user_id,
                    item_id: id,
                    action_id: None,
                    data: Some(json!({"added_tags": added, "removed_tags": removed})),
                },
            )?;
        }

        let tags = issue_tags(&tx, id)?;
        let status = status_for_tags(&tx, &tags, before.status)?;
        if status != before.status {
            tx.execute(
                "UPDATE projects_issues SET status = ?1 WHERE id = ?2",
                params![status.id(), id],
            )
            .context("Failed to update issue status")?;
            let type_id = match status {
                IssueStatus::Closed => ActivityType::CloseIssue,
                IssueStatus::Open => ActivityType::ReopenIssue,
            };
            insert_activity(
                &tx,
                &NewActivity {
                    type_id,
                    parent_id: before.project_id,
                    user_id,
                    item_id: id,
                    action_id: None,
                    data: None,
                },
            )?;
        }

        tx.execute(
            "UPDATE projects_issues SET updated_by = ?1, updated_at = datetime('now') WHERE id = ?2",
            params![user_id, id],
        )
        .context("Failed to touch issue")?;

        tx.commit().context("Failed to commit issue update")?;
        self.get_issue(id)?.context("Issue not found after update")
    }

    pub fn delete_issue(&self, id: i64) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM projects_issues WHERE id = ?1", params![id])
            .context("Failed to delete issue")?;
        Ok(count > 0)
    }

    /// Open issues of a project for the issue list, most recently updated
    /// first.
    pub fn list_issue_summaries(&self, project_id: i64) -> Result<Vec<IssueSummary>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT i.id, i.project_id, i.title, i.body, i.created_by, i.updated_by, i.assigned_to,
                        i.time_quote, i.lock_quote, i.status, i.created_at, i.updated_at,
                        (SELECT COUNT(*) FROM projects_issues_comments c WHERE c.issue_id = i.id),
                        COALESCE(cu.firstname || ' ' || cu.lastname, ''),
                        uu.firstname || ' ' || uu.lastname
                 FROM projects_issues i
                 LEFT JOIN users cu ON cu.id = i.created_by
                 LEFT JOIN users uu ON uu.id = i.updated_by
                 WHERE i.project_id = ?1 AND i.status = ?2
                 ORDER BY i.updated_at DESC, i.id DESC",
            )
            .context("Failed to prepare list_issue_summaries")?;
        let rows = stmt
            .query_map(params![project_id, IssueStatus::Open.id()], |row| {
                Ok(IssueSummary {
                    issue: issue_from_row(row)?,
                    count_comments: row.get(12)?,
                    created_by_name: row.get(13)?,
                    updated_by_name: row.get(14)?,
                })
            })
            .context("Failed to query issue summaries")?;
        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row.context("Failed to read issue summary row")?);
        }
        Ok(summaries)
    }

    // ── Comments ──────────────────────────────────────────────────────

    pub fn add_comment(&self, issue: &Issue, user_id: i64, comment: &str) -> Result<Comment> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        tx.execute(
            "INSERT INTO projects_issues_comments (project_id, issue_id, created_by, comment)
             VALUES (?1, ?2, ?3, ?4)",
            params![issue.project_id, issue.id, user_id, comment],
        )
        .context("Failed to insert comment")?;
        let id = tx.last_insert_rowid();
        insert_activity(
            &tx,
            &NewActivity {
                type_id: ActivityType::Comment,
                parent_id: issue.project_id,
                user_id,
                item_id: issue.id,
                action_id: Some(id),
                data: None,
            },
        )?;
        tx.commit().context("Failed to commit comment")?;
        self.comments_for_issue(issue.id)?
            .into_iter()
            .find(|c| c.id == id)
            .context("Comment not found after insert")
    }

    pub fn comments_for_issue(&self, issue_id: i64) -> Result<Vec<Comment>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, issue_id, created_by, comment, created_at
                 FROM projects_issues_comments WHERE issue_id = ?1 ORDER BY id",
            )
            .context("Failed to prepare comments_for_issue")?;
        let rows = stmt
            .query_map(params![issue_id], |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    issue_id: row.get(2)?,
                    created_by: row.get(3)?,
                    comment: row.get(4)?,
                    created_at: row.get(5)?,
                })
            })
            .context("Failed to query comments")?;
        let mut comments = Vec::new();
        for row in rows {
            comments.push(row.context("Failed to read comment row")?);
        }
        Ok(comments)
    }
}
