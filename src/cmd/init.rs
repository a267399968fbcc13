//! Database setup command (`tinyissue init`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use tinyissue::config::TinyissueToml;
use tinyissue::tracker::db::TrackerDb;
use tinyissue::tracker::storage::AttachmentStore;
use tracing::info;

pub fn cmd_init(config: TinyissueToml, db_path: Option<PathBuf>) -> Result<()> {
    let db_path = db_path.unwrap_or(config.server.db_path);
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    TrackerDb::new(&db_path)?;

    let store = AttachmentStore::new(&config.storage.uploads_root);
    std::fs::create_dir_all(store.uploads_dir()).context("Failed to create uploads directory")?;

    info!(db = %db_path.display(), "Database initialized");
    println!("Tinyissue database initialized at {}", db_path.display());
    Ok(())
}
