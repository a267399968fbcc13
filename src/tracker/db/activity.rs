use anyhow::{Context, Result};
use rusqlite::{Connection, Row, params};

use super::{TrackerDb, conversion_error};
use crate::tracker::models::*;

fn activity_from_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    let type_id: i64 = row.get(1)?;
    let data: Option<String> = row.get(6)?;
    Ok(Activity {
        id: row.get(0)?,
        type_id: ActivityType::from_id(type_id)
            .ok_or_else(|| conversion_error(1, format!("Invalid activity type: {}", type_id)))?,
        parent_id: row.get(2)?,
        user_id: row.get(3)?,
        item_id: row.get(4)?,
        action_id: row.get(5)?,
        data: data.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

/// Insert an activity row on `conn`, which may be an open transaction.
pub(super) fn insert_activity(conn: &Connection, activity: &NewActivity) -> Result<i64> {
    let data = activity
        .data
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize activity data")?;
    conn.execute(
        "INSERT INTO users_activity (type_id, parent_id, user_id, item_id, action_id, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            activity.type_id.id(),
            activity.parent_id,
            activity.user_id,
            activity.item_id,
            activity.action_id,
            data
        ],
    )
    .context("Failed to insert activity")?;
    Ok(conn.last_insert_rowid())
}

impl TrackerDb {
    // ── Activity log ──────────────────────────────────────────────────

    pub fn log_activity(&self, activity: &NewActivity) -> Result<i64> {
        insert_activity(&self.conn, activity)
    }

    /// Most recent activity of a project, newest first.
    pub fn project_activity(&self, project_id: i64, limit: i64) -> Result<Vec<Activity>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, type_id, parent_id, user_id, item_id, action_id, data, created_at, updated_at
                 FROM users_activity WHERE parent_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .context("Failed to prepare project_activity")?;
        let rows = stmt
            .query_map(params![project_id, limit], activity_from_row)
            .context("Failed to query activity")?;
        let mut activities = Vec::new();
        for row in rows {
            activities.push(row.context("Failed to read activity row")?);
        }
        Ok(activities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_log_and_read_activity() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        db.log_activity(&NewActivity {
            type_id: ActivityType::Note,
            parent_id: 5,
            user_id: 1,
            item_id: 2,
            action_id: None,
            data: Some(json!({"note": {"body": "hello"}})),
        })?;
        db.log_activity(&NewActivity {
            type_id: ActivityType::IssueMove,
            parent_id: 5,
            user_id: 1,
            item_id: 2,
            action_id: Some(9),
            data: None,
        })?;
        db.log_activity(&NewActivity {
            type_id: ActivityType::Note,
            parent_id: 6,
            user_id: 1,
            item_id: 3,
            action_id: None,
            data: None,
        })?;

        let activities = db.project_activity(5, 10)?;
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].type_id, ActivityType::IssueMove);
        assert_eq!(activities[0].action_id, Some(9));
        assert_eq!(
            activities[1].data_value("note.body"),
            Some(&json!("hello"))
        );
        Ok(())
    }

    #[test]
    fn test_project_activity_respects_limit() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        for item in 0..5 {
            db.log_activity(&NewActivity {
                type_id: ActivityType::Comment,
                parent_id: 1,
                user_id: 1,
                item_id: item,
                action_id: None,
                data: None,
            })?;
        }
        let activities = db.project_activity(1, 3)?;
        assert_eq!(activities.len(), 3);
        assert_eq!(activities[0].item_id, 4);
        Ok(())
    }
}
