use anyhow::{Context, Result};
use rusqlite::{Row, params};

use super::{TrackerDb, conversion_error};
use crate::tracker::models::*;

const TAG_COLUMNS: &str = "id, parent_id, name, bgcolor, is_group, role_limit";

pub(super) fn tag_from_row(row: &Row<'_>) -> rusqlite::Result<Tag> {
    let role_limit = match row.get::<_, Option<i64>>(5)? {
        None | Some(0) => None,
        Some(id) => Some(
            Role::from_id(id)
                .ok_or_else(|| conversion_error(5, format!("Invalid role limit: {}", id)))?,
        ),
    };
    Ok(Tag {
        id: row.get(0)?,
        parent_id: row.get(1)?,
        name: row.get(2)?,
        bgcolor: row.get(3)?,
        group: row.get(4)?,
        role_limit,
    })
}

impl TrackerDb {
    // ── Tags ──────────────────────────────────────────────────────────

    /// All tag groups ordered by name, each with its tags in creation order.
    pub fn tag_groups(&self) -> Result<Vec<TagGroup>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM tags WHERE is_group = 1 ORDER BY name",
                TAG_COLUMNS
            ))
            .context("Failed to prepare tag_groups")?;
        let rows = stmt
            .query_map([], tag_from_row)
            .context("Failed to query tag groups")?;
        let mut groups = Vec::new();
        for row in rows {
            let group = row.context("Failed to read tag group row")?;
            let tags = self.tags_in_group(group.id)?;
            groups.push(TagGroup { group, tags });
        }
        Ok(groups)
    }

    pub fn tag_group(&self, name: &str) -> Result<Option<TagGroup>> {
        Ok(self.tag_groups()?.into_iter().find(|g| g.group.name == name))
    }

    fn tags_in_group(&self, group_id: i64) -> Result<Vec<Tag>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM tags WHERE parent_id = ?1 AND is_group = 0 ORDER BY id",
                TAG_COLUMNS
            ))
            .context("Failed to prepare tags_in_group")?;
        let rows = stmt
            .query_map(params![group_id], tag_from_row)
            .context("Failed to query tags")?;
        let mut tags = Vec::new();
        for row in rows {
            tags.push(row.context("Failed to read tag row")?);
        }
        Ok(tags)
    }

    pub fn get_tag(&self, id: i64) -> Result<Option<Tag>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM tags WHERE id = ?1", TAG_COLUMNS))
            .context("Failed to prepare get_tag")?;
        let mut rows = stmt
            .query_map(params![id], tag_from_row)
            .context("Failed to query tag")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read tag row")?)),
            None => Ok(None),
        }
    }

    pub fn create_tag(&self, info: &NewTag) -> Result<Tag> {
        self.conn
            .execute(
                "INSERT INTO tags (parent_id, name, bgcolor, is_group, role_limit) VALUES (?1, ?2, ?3, 0, ?4)",
                params![
                    info.parent_id,
                    info.name,
                    info.bgcolor,
                    info.role_limit.map(|r| r.id())
                ],
            )
            .context("Failed to insert tag")?;
        let id = self.conn.last_insert_rowid();
        self.get_tag(id)?.context("Tag not found after insert")
    }

    pub fn update_tag(&self, id: i64, info: &NewTag) -> Result<Tag> {
        self.conn
            .execute(
                "UPDATE tags SET parent_id = ?1, name = ?2, bgcolor = ?3, role_limit = ?4 WHERE id = ?5",
                params![
                    info.parent_id,
                    info.name,
                    info.bgcolor,
                    info.role_limit.map(|r| r.id()),
                    id
                ],
            )
            .context("Failed to update tag")?;
        self.get_tag(id)?.context("Tag not found after update")
    }
}
