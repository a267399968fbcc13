//! Configuration for Tinyissue, read from `tinyissue.toml`.
//!
//! Values are layered: file → environment → CLI flags. Every section is
//! optional and falls back to defaults.
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//! db_path = "storage/tinyissue.db"
//! dev_mode = false
//!
//! [storage]
//! uploads_root = "storage"
//!
//! [app]
//! language = "en"
//! user_header = "x-tinyissue-user"
//! log_format = "pretty"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "tinyissue.toml";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Permissive CORS and bind on all interfaces.
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("storage/tinyissue.db")
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            db_path: default_db_path(),
            dev_mode: false,
        }
    }
}

/// `[storage]` section. Attachments land under `{uploads_root}/uploads/...`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    #[serde(default = "default_uploads_root")]
    pub uploads_root: PathBuf,
}

fn default_uploads_root() -> PathBuf {
    PathBuf::from("storage")
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            uploads_root: default_uploads_root(),
        }
    }
}

/// `[app]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSection {
    /// Language assigned to newly created users.
    #[serde(default = "default_language")]
    pub language: String,
    /// Header carrying the authenticated user id, set by the front proxy.
    #[serde(default = "default_user_header")]
    pub user_header: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_user_header() -> String {
    "x-tinyissue-user".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            language: default_language(),
            user_header: default_user_header(),
            log_format: LogFormat::default(),
        }
    }
}

/// The complete tinyissue.toml structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TinyissueToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub app: AppSection,
}

impl TinyissueToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse tinyissue.toml")
    }

    /// Load `tinyissue.toml` from `dir`, or defaults when the file is absent.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `TINYISSUE_*` environment overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(port) = lookup("TINYISSUE_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }
        if let Some(db) = lookup("TINYISSUE_DB") {
            self.server.db_path = PathBuf::from(db);
        }
        if let Some(root) = lookup("TINYISSUE_UPLOADS") {
            self.storage.uploads_root = PathBuf::from(root);
        }
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; the OS will pick a random port".to_string());
        }
        if self.app.user_header.trim().is_empty() {
            warnings.push("app.user_header is empty; every request will be a guest".to_string());
        } else if axum::http::HeaderName::from_bytes(self.app.user_header.as_bytes()).is_err() {
            warnings.push(format!(
                "app.user_header '{}' is not a valid HTTP header name",
                self.app.user_header
            ));
        }
        if !crate::lang::is_supported(&self.app.language) {
            warnings.push(format!(
                "app.language '{}' has no translations; falling back to English",
                self.app.language
            ));
        }

        warnings
    }
}
