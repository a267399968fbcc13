//! Attachment files on disk.
//!
//! Files live at `{root}/uploads/{project_id}/{upload_token}/{filename}`.
//! The database row is the source of truth; the file is removed on a
//! best-effort basis.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::db::DbHandle;
use super::models::{Attachment, NewAttachment};
use crate::errors::TrackerError;

#[derive(Debug, Clone)]
pub struct AttachmentStore {
    root: PathBuf,
}

/// Reject path components that could escape the upload directory.
fn check_component(kind: &str, value: &str) -> Result<(), TrackerError> {
    if value.is_empty()
        || value == "."
        || value.contains("..")
        || value.contains('/')
        || value.contains('\\')
    {
        return Err(TrackerError::BadRequest(format!("Invalid {}: {:?}", kind, value)));
    }
    Ok(())
}

fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string()
}

impl AttachmentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    fn token_dir(&self, project_id: i64, upload_token: &str) -> PathBuf {
        self.uploads_dir()
            .join(project_id.to_string())
            .join(upload_token)
    }

    /// On-disk path of an attachment uploaded to `project_id`.
    pub fn path_for(
        &self,
        project_id: i64,
        upload_token: &str,
        filename: &str,
    ) -> Result<PathBuf, TrackerError> {
        check_component("upload token", upload_token)?;
        check_component("filename", filename)?;
        Ok(self.token_dir(project_id, upload_token).join(filename))
    }

    /// Write an uploaded file and record it as a pending attachment of
    /// `user_id`.
    pub async fn upload_attachment(
        &self,
        db: &DbHandle,
        project_id: i64,
        user_id: i64,
        upload_token: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Attachment, TrackerError> {
        let path = self.path_for(project_id, upload_token, filename)?;
        let dir = self.token_dir(project_id, upload_token);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| TrackerError::Storage {
                path: dir.clone(),
                source,
            })?;
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| TrackerError::Storage {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), size = bytes.len(), "Stored attachment");

        let info = NewAttachment {
            project_id,
            uploaded_by: user_id,
            filename: filename.to_string(),
            fileextension: file_extension(filename),
            filesize: bytes.len() as i64,
            upload_token: upload_token.to_string(),
        };
        db.call(move |db| db.insert_attachment(&info))
            .await
            .map_err(TrackerError::Database)
    }

    /// Remove a pending upload. The row is scoped by owner, token and
    /// filename; a non-matching request deletes nothing. Filesystem cleanup
    /// failures are logged and swallowed.
    pub async fn remove_attachment(
        &self,
        db: &DbHandle,
        project_id: i64,
        user_id: i64,
        upload_token: &str,
        filename: &str,
    ) -> Result<usize, TrackerError> {
        let path = self.path_for(project_id, upload_token, filename)?;
        let (token, name) = (upload_token.to_string(), filename.to_string());
        let removed = db
            .call(move |db| db.remove_attachment_record(project_id, user_id, &token, &name))
            .await
            .map_err(TrackerError::Database)?;
        if removed == 0 {
            return Ok(0);
        }

        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove attachment file");
        }
        let dir = self.token_dir(project_id, upload_token);
        if let Err(e) = tokio::fs::remove_dir(&dir).await {
            debug!(path = %dir.display(), error = %e, "Upload directory not removed");
        }
        Ok(removed)
    }

    /// Read the file behind a linked attachment.
    pub async fn read(
        &self,
        project_id: i64,
        attachment: &Attachment,
    ) -> Result<Vec<u8>, TrackerError> {
        let path = self.path_for(project_id, &attachment.upload_token, &attachment.filename)?;
        tokio::fs::read(&path)
            .await
            .map_err(|source| TrackerError::Storage { path, source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::db::TrackerDb;

    fn setup() -> (tempfile::TempDir, AttachmentStore, DbHandle) {
        let dir = tempfile::tempdir().unwrap();
        let store = AttachmentStore::new(dir.path());
        let db = DbHandle::new(TrackerDb::new_in_memory().unwrap());
        (dir, store, db)
    }

    #[test]
    fn test_path_layout() {
        let store = AttachmentStore::new("/data");
        let path = store.path_for(3, "tok", "a.png").unwrap();
        assert_eq!(path, PathBuf::from("/data/uploads/3/tok/a.png"));
    }

    #[test]
    fn test_path_rejects_traversal() {
        let store = AttachmentStore::new("/data");
        assert!(store.path_for(3, "..", "a.png").is_err());
        assert!(store.path_for(3, "tok", "../a.png").is_err());
        assert!(store.path_for(3, "tok", "dir/a.png").is_err());
        assert!(store.path_for(3, "tok", "").is_err());
    }

    #[tokio::test]
    async fn test_upload_writes_file_and_row() {
        let (_dir, store, db) = setup();
        let attachment = store
            .upload_attachment(&db, 1, 7, "tok", "shot.PNG", b"image")
            .await
            .unwrap();
        assert_eq!(attachment.fileextension, "PNG");
        assert_eq!(attachment.filesize, 5);
        assert!(attachment.is_image());

        let on_disk = store.path_for(1, "tok", "shot.PNG").unwrap();
        assert_eq!(std::fs::read(on_disk).unwrap(), b"image");
    }

    #[tokio::test]
    async fn test_remove_non_matching_is_silent() {
        let (_dir, store, db) = setup();
        store
            .upload_attachment(&db, 1, 7, "tok", "a.txt", b"x")
            .await
            .unwrap();

        let removed = store
            .remove_attachment(&db, 1, 8, "tok", "a.txt")
            .await
            .unwrap();
        assert_eq!(removed, 0);
        let removed = store
            .remove_attachment(&db, 1, 7, "other", "a.txt")
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert!(store.path_for(1, "tok", "a.txt").unwrap().exists());
    }

    #[tokio::test]
    async fn test_remove_deletes_file_and_empty_dir() {
        let (_dir, store, db) = setup();
        store
            .upload_attachment(&db, 1, 7, "tok", "a.txt", b"x")
            .await
            .unwrap();
        let removed = store
            .remove_attachment(&db, 1, 7, "tok", "a.txt")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!store.path_for(1, "tok", "a.txt").unwrap().exists());
        assert!(!store.uploads_dir().join("1").join("tok").exists());
    }

    #[tokio::test]
    async fn test_remove_tolerates_missing_file() {
        let (_dir, store, db) = setup();
        store
            .upload_attachment(&db, 1, 7, "tok", "a.txt", b"x")
            .await
            .unwrap();
        std::fs::remove_file(store.path_for(1, "tok", "a.txt").unwrap()).unwrap();
        let removed = store
            .remove_attachment(&db, 1, 7, "tok", "a.txt")
            .await
            .unwrap();
        assert_eq!(removed, 1);
    }
}
