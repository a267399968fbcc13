use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::TrackerDb;
use crate::tracker::models::*;

const ATTACHMENT_COLUMNS: &str = "id, issue_id, comment_id, uploaded_by, filename, fileextension, \
                                  filesize, upload_token, created_at, updated_at";

fn attachment_from_row(row: &Row<'_>) -> rusqlite::Result<Attachment> {
    Ok(Attachment {
        id: row.get(0)?,
        issue_id: row.get(1)?,
        comment_id: row.get(2)?,
        uploaded_by: row.get(3)?,
        filename: row.get(4)?,
        fileextension: row.get(5)?,
        filesize: row.get(6)?,
        upload_token: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl TrackerDb {
    // ── Attachments ───────────────────────────────────────────────────

    /// Record an uploaded file that is not yet linked to an issue.
    pub fn insert_attachment(&self, info: &NewAttachment) -> Result<Attachment> {
        self.conn
            .execute(
                "INSERT INTO projects_issues_attachments (project_id, uploaded_by, filename, fileextension, filesize, upload_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    info.project_id,
                    info.uploaded_by,
                    info.filename,
                    info.fileextension,
                    info.filesize,
                    info.upload_token
                ],
            )
            .context("Failed to insert attachment")?;
        let id = self.conn.last_insert_rowid();
        self.get_attachment(id)?
            .context("Attachment not found after insert")
    }

    /// Delete attachment rows of `project_id` matching owner, token and
    /// filename. Returns the number of rows removed; zero is not an error.
    pub fn remove_attachment_record(
        &self,
        project_id: i64,
        user_id: i64,
        upload_token: &str,
        filename: &str,
    ) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM projects_issues_attachments
                 WHERE project_id = ?1 AND uploaded_by = ?2 AND upload_token = ?3 AND filename = ?4",
                params![project_id, user_id, upload_token, filename],
            )
            .context("Failed to delete attachment")
    }

    /// Link every pending upload of `upload_token` by `user_id` to an issue
    /// (and optionally a comment). Uploads made under another project stay
    /// pending.
    pub fn claim_attachments(
        &self,
        upload_token: &str,
        user_id: i64,
        issue_id: i64,
        comment_id: Option<i64>,
    ) -> Result<usize> {
        self.conn
            .execute(
                "UPDATE projects_issues_attachments
                 SET issue_id = ?1, comment_id = ?2, updated_at = datetime('now')
                 WHERE upload_token = ?3 AND uploaded_by = ?4 AND issue_id IS NULL
                   AND project_id = (SELECT project_id FROM projects_issues WHERE id = ?1)",
                params![issue_id, comment_id, upload_token, user_id],
            )
            .context("Failed to claim attachments")
    }

    pub fn attachments_for_issue(&self, issue_id: i64) -> Result<Vec<Attachment>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM projects_issues_attachments WHERE issue_id = ?1 ORDER BY id",
                ATTACHMENT_COLUMNS
            ))
            .context("Failed to prepare attachments_for_issue")?;
        let rows = stmt
            .query_map(params![issue_id], attachment_from_row)
            .context("Failed to query attachments")?;
        let mut attachments = Vec::new();
        for row in rows {
            attachments.push(row.context("Failed to read attachment row")?);
        }
        Ok(attachments)
    }

    pub fn get_attachment(&self, id: i64) -> Result<Option<Attachment>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM projects_issues_attachments WHERE id = ?1",
                ATTACHMENT_COLUMNS
            ))
            .context("Failed to prepare get_attachment")?;
        let mut rows = stmt
            .query_map(params![id], attachment_from_row)
            .context("Failed to query attachment")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read attachment row")?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending(project_id: i64, user_id: i64, token: &str, filename: &str) -> NewAttachment {
        NewAttachment {
            project_id,
            uploaded_by: user_id,
            filename: filename.to_string(),
            fileextension: "png".to_string(),
            filesize: 42,
            upload_token: token.to_string(),
        }
    }

    #[test]
    fn test_insert_pending_attachment() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let attachment = db.insert_attachment(&pending(5, 1, "tok", "shot.png"))?;
        assert!(attachment.issue_id.is_none());
        assert!(attachment.download(1).is_none());
        assert_eq!(attachment.filesize, 42);
        Ok(())
    }

    #[test]
    fn test_remove_requires_matching_owner_token_and_filename() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let attachment = db.insert_attachment(&pending(5, 1, "tok", "shot.png"))?;

        assert_eq!(db.remove_attachment_record(5, 2, "tok", "shot.png")?, 0);
        assert_eq!(db.remove_attachment_record(5, 1, "other", "shot.png")?, 0);
        assert_eq!(db.remove_attachment_record(5, 1, "tok", "other.png")?, 0);
        assert_eq!(db.remove_attachment_record(6, 1, "tok", "shot.png")?, 0);
        assert!(db.get_attachment(attachment.id)?.is_some());

        assert_eq!(db.remove_attachment_record(5, 1, "tok", "shot.png")?, 1);
        assert!(db.get_attachment(attachment.id)?.is_none());
        Ok(())
    }

    #[test]
    fn test_claim_links_only_own_pending_uploads() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let project = db.create_project(&NewProject {
            name: "files".into(),
            ..Default::default()
        })?;
        let issue = db.create_issue(
            project.id,
            1,
            &NewIssue {
                title: "t".into(),
                body: "b".into(),
                ..Default::default()
            },
        )?;
        db.insert_attachment(&pending(project.id, 1, "tok", "a.png"))?;
        db.insert_attachment(&pending(project.id, 1, "tok", "b.txt"))?;
        db.insert_attachment(&pending(project.id, 2, "tok", "c.png"))?;
        let elsewhere = db.insert_attachment(&pending(project.id + 1, 1, "tok", "d.png"))?;

        assert_eq!(db.claim_attachments("tok", 1, issue.id, None)?, 2);
        let attachments = db.attachments_for_issue(issue.id)?;
        assert_eq!(attachments.len(), 2);
        assert!(attachments.iter().all(|a| a.uploaded_by == 1));
        assert!(attachments[0].download(project.id).is_some());

        assert!(db.get_attachment(elsewhere.id)?.unwrap().issue_id.is_none());

        // Already claimed rows are left alone.
        assert_eq!(db.claim_attachments("tok", 1, issue.id, None)?, 0);
        Ok(())
    }
}
