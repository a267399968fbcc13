use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use rusqlite::{Row, ToSql, Transaction, params};

use super::{TrackerDb, conversion_error};
use crate::tracker::models::*;

const USER_COLUMNS: &str =
    "id, email, firstname, lastname, role_id, private, status, language, deleted, created_at, updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_id: i64 = row.get(4)?;
    let role = Role::from_id(role_id)
        .ok_or_else(|| conversion_error(4, format!("Invalid role id: {}", role_id)))?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        firstname: row.get(2)?,
        lastname: row.get(3)?,
        role,
        private: row.get(5)?,
        status: row.get(6)?,
        language: row.get(7)?,
        deleted: row.get::<_, i64>(8)? == DELETED_USERS,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Argon2id hash in PHC string form, salted per call.
fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Check `password` against a stored PHC hash. Malformed hashes never match.
#[cfg(test)]
pub(crate) fn verify_password(stored: &str, password: &str) -> bool {
    use argon2::password_hash::{PasswordHash, PasswordVerifier};

    PasswordHash::new(stored).is_ok_and(|hash| {
        Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok()
    })
}

fn set_user_column(tx: &Transaction<'_>, id: i64, column: &str, value: &dyn ToSql) -> Result<()> {
    tx.execute(
        &format!(
            "UPDATE users SET {} = ?1, updated_at = datetime('now') WHERE id = ?2",
            column
        ),
        params![value, id],
    )
    .with_context(|| format!("Failed to update user {}", column))?;
    Ok(())
}

impl TrackerDb {
    // ── User CRUD ─────────────────────────────────────────────────────

    /// Add a new user; `language` is the application default.
    pub fn create_user(&self, info: &NewUser, language: &str) -> Result<User> {
        let password = hash_password(&info.password)?;
        self.conn
            .execute(
                "INSERT INTO users (email, firstname, lastname, role_id, private, password, status, language)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    info.email,
                    info.firstname,
                    info.lastname,
                    info.role.id(),
                    info.private,
                    password,
                    info.status,
                    language
                ],
            )
            .context("Failed to insert user")?;
        let id = self.conn.last_insert_rowid();
        self.get_user(id)?.context("User not found after insert")
    }

    pub fn get_user(&self, id: i64) -> Result<Option<User>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS))
            .context("Failed to prepare get_user")?;
        let mut rows = stmt
            .query_map(params![id], user_from_row)
            .context("Failed to query user")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read user row")?)),
            None => Ok(None),
        }
    }

    pub fn password_hash(&self, id: i64) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT password FROM users WHERE id = ?1")
            .context("Failed to prepare password_hash")?;
        let mut rows = stmt
            .query_map(params![id], |row| row.get::<_, String>(0))
            .context("Failed to query password")?;
        match rows.next() {
            Some(row) => Ok(Some(row.context("Failed to read password")?)),
            None => Ok(None),
        }
    }

    /// Soft-delete a user: flag the row, suffix the email with `_deleted`
    /// and drop every project membership. Returns false for unknown ids.
    pub fn delete_user(&self, id: i64) -> Result<bool> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let count = tx
            .execute(
                "UPDATE users SET email = email || '_deleted', deleted = ?1, updated_at = datetime('now')
                 WHERE id = ?2",
                params![DELETED_USERS, id],
            )
            .context("Failed to soft delete user")?;
        tx.execute("DELETE FROM projects_users WHERE user_id = ?1", params![id])
            .context("Failed to remove user from projects")?;
        tx.commit().context("Failed to commit user delete")?;
        Ok(count > 0)
    }

    /// Update a user's own settings. Role changes are dropped.
    pub fn update_setting(&self, id: i64, info: UserUpdate) -> Result<User> {
        self.update_user(id, info.settings_only())
    }

    /// Apply a partial update. An empty password never overwrites the
    /// stored credential.
    pub fn update_user(&self, id: i64, info: UserUpdate) -> Result<User> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;

        if let Some(email) = &info.email {
            set_user_column(&tx, id, "email", email)?;
        }
        if let Some(firstname) = &info.firstname {
            set_user_column(&tx, id, "firstname", firstname)?;
        }
        if let Some(lastname) = &info.lastname {
            set_user_column(&tx, id, "lastname", lastname)?;
        }
        if let Some(language) = &info.language {
            set_user_column(&tx, id, "language", language)?;
        }
        if let Some(password) = info.password.as_deref().filter(|p| !p.is_empty()) {
            set_user_column(&tx, id, "password", &hash_password(password)?)?;
        }
        if let Some(private) = info.private {
            set_user_column(&tx, id, "private", &private)?;
        }
        if let Some(status) = info.status {
            set_user_column(&tx, id, "status", &status)?;
        }
        if let Some(role) = info.role {
            set_user_column(&tx, id, "role_id", &role.id())?;
        }

        tx.commit().context("Failed to commit user update")?;
        self.get_user(id)?.context("User not found after update")
    }

    /// Set the message preference for each of the user's projects listed in
    /// `settings` (project id → message id). Projects the user is not a
    /// member of are ignored. Returns the number of rows changed.
    pub fn update_messages_settings(&self, user_id: i64, settings: &BTreeMap<i64, i64>) -> Result<usize> {
        let tx = self
            .conn
            .unchecked_transaction()
            .context("Failed to begin transaction")?;
        let mut changed = 0;
        for (project_id, message_id) in settings {
            changed += tx
                .execute(
                    "UPDATE projects_users SET message_id = ?1 WHERE user_id = ?2 AND project_id = ?3",
                    params![message_id, user_id, project_id],
                )
                .context("Failed to update message setting")?;
        }
        tx.commit().context("Failed to commit message settings")?;
        Ok(changed)
    }

    pub fn project_memberships(&self, user_id: i64) -> Result<Vec<ProjectUser>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, user_id, project_id, message_id FROM projects_users
                 WHERE user_id = ?1 ORDER BY project_id",
            )
            .context("Failed to prepare project_memberships")?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(ProjectUser {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    project_id: row.get(2)?,
                    message_id: row.get(3)?,
                })
            })
            .context("Failed to query project memberships")?;
        let mut memberships = Vec::new();
        for row in rows {
            memberships.push(row.context("Failed to read membership row")?);
        }
        Ok(memberships)
    }

    pub fn add_project_user(&self, project_id: i64, user_id: i64) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO projects_users (user_id, project_id) VALUES (?1, ?2)",
                params![user_id, project_id],
            )
            .context("Failed to add user to project")?;
        Ok(())
    }

    /// Active project members allowed to fix issues (developer and above),
    /// ordered by first name.
    pub fn users_can_fix_issue(&self, project_id: i64) -> Result<Vec<User>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT u.id, u.email, u.firstname, u.lastname, u.role_id, u.private, u.status, u.language,
                        u.deleted, u.created_at, u.updated_at
                 FROM users u JOIN projects_users pu ON pu.user_id = u.id
                 WHERE pu.project_id = ?1 AND u.deleted = 0 AND u.role_id >= ?2
                 ORDER BY u.firstname, u.lastname",
            )
            .context("Failed to prepare users_can_fix_issue")?;
        let rows = stmt
            .query_map(params![project_id, Role::Developer.id()], user_from_row)
            .context("Failed to query project developers")?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row.context("Failed to read user row")?);
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str, role: Role) -> NewUser {
        NewUser {
            email: email.to_string(),
            firstname: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            role,
            private: false,
            password: "secret".to_string(),
            status: 1,
        }
    }

    #[test]
    fn test_create_user_hashes_password_and_sets_language() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let user = db.create_user(&new_user("ada@example.com", Role::Developer), "fr")?;
        assert_eq!(user.language, "fr");
        assert_eq!(user.role, Role::Developer);
        assert!(!user.deleted);

        let hash = db.password_hash(user.id)?.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "secret"));
        assert!(!verify_password(&hash, "wrong"));
        Ok(())
    }

    #[test]
    fn test_duplicate_email_rejected() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        db.create_user(&new_user("dup@example.com", Role::User), "en")?;
        assert!(db.create_user(&new_user("dup@example.com", Role::User), "en").is_err());
        Ok(())
    }

    #[test]
    fn test_delete_user_soft_deletes_and_drops_memberships() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let user = db.create_user(&new_user("gone@example.com", Role::Developer), "en")?;
        let other = db.create_user(&new_user("stay@example.com", Role::Developer), "en")?;
        let p1 = db.create_project(&NewProject {
            name: "one".into(),
            user_ids: vec![user.id, other.id],
            ..Default::default()
        })?;
        let p2 = db.create_project(&NewProject {
            name: "two".into(),
            user_ids: vec![user.id],
            ..Default::default()
        })?;
        assert_eq!(db.project_memberships(user.id)?.len(), 2);

        assert!(db.delete_user(user.id)?);

        let deleted = db.get_user(user.id)?.unwrap();
        assert!(deleted.deleted);
        assert_eq!(deleted.email, "gone@example.com_deleted");
        assert!(db.project_memberships(user.id)?.is_empty());
        assert_eq!(db.project_memberships(other.id)?.len(), 1);
        assert!(db.users_can_fix_issue(p1.id)?.iter().all(|u| u.id != user.id));
        assert!(db.users_can_fix_issue(p2.id)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_delete_unknown_user() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        assert!(!db.delete_user(404)?);
        Ok(())
    }

    #[test]
    fn test_update_user_ignores_empty_password() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let user = db.create_user(&new_user("pw@example.com", Role::User), "en")?;
        let before = db.password_hash(user.id)?.unwrap();

        let updated = db.update_user(
            user.id,
            UserUpdate {
                firstname: Some("Grace".into()),
                password: Some(String::new()),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.firstname, "Grace");
        assert_eq!(db.password_hash(user.id)?.unwrap(), before);

        db.update_user(
            user.id,
            UserUpdate {
                password: Some("new-secret".into()),
                ..Default::default()
            },
        )?;
        let after = db.password_hash(user.id)?.unwrap();
        assert!(verify_password(&after, "new-secret"));
        Ok(())
    }

    #[test]
    fn test_update_setting_cannot_change_role() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let user = db.create_user(&new_user("me@example.com", Role::User), "en")?;
        let updated = db.update_setting(
            user.id,
            UserUpdate {
                language: Some("fr".into()),
                role: Some(Role::Administrator),
                ..Default::default()
            },
        )?;
        assert_eq!(updated.language, "fr");
        assert_eq!(updated.role, Role::User);
        Ok(())
    }

    #[test]
    fn test_update_messages_settings_only_touches_memberships() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let user = db.create_user(&new_user("msg@example.com", Role::User), "en")?;
        let member = db.create_project(&NewProject {
            name: "member".into(),
            user_ids: vec![user.id],
            ..Default::default()
        })?;
        let stranger = db.create_project(&NewProject {
            name: "stranger".into(),
            ..Default::default()
        })?;

        let settings = BTreeMap::from([(member.id, 3), (stranger.id, 2)]);
        assert_eq!(db.update_messages_settings(user.id, &settings)?, 1);
        let memberships = db.project_memberships(user.id)?;
        assert_eq!(memberships.len(), 1);
        assert_eq!(memberships[0].message_id, 3);
        Ok(())
    }

    #[test]
    fn test_users_can_fix_issue_excludes_plain_users() -> Result<()> {
        let db = TrackerDb::new_in_memory()?;
        let dev = db.create_user(&new_user("dev@example.com", Role::Developer), "en")?;
        let reporter = db.create_user(&new_user("rep@example.com", Role::User), "en")?;
        let project = db.create_project(&NewProject {
            name: "p".into(),
            user_ids: vec![dev.id, reporter.id],
            ..Default::default()
        })?;
        let fixers = db.users_can_fix_issue(project.id)?;
        assert_eq!(fixers.len(), 1);
        assert_eq!(fixers[0].id, dev.id);
        Ok(())
    }

    #[test]
    fn test_verify_password_rejects_malformed_hash() {
        assert!(!verify_password("plain", "plain"));
        assert!(!verify_password("md5$x$y", "y"));
        assert!(!verify_password("sha256$salt$abcdef", "abcdef"));
    }
}
