use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use axum::http::HeaderName;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::api::{self, AppState, Settings};
use super::db::{DbHandle, TrackerDb};
use super::storage::AttachmentStore;
use crate::config::TinyissueToml;

/// Configuration for the tracker server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub uploads_root: PathBuf,
    pub user_header: String,
    pub language: String,
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from(&TinyissueToml::default())
    }
}

impl From<&TinyissueToml> for ServerConfig {
    fn from(config: &TinyissueToml) -> Self {
        Self {
            host: config.server.host.clone(),
            port: config.server.port,
            db_path: config.server.db_path.clone(),
            uploads_root: config.storage.uploads_root.clone(),
            user_header: config.app.user_header.clone(),
            language: config.app.language.clone(),
            dev_mode: config.server.dev_mode,
        }
    }
}

impl ServerConfig {
    fn settings(&self) -> Result<Settings> {
        let user_header = HeaderName::from_bytes(self.user_header.trim().as_bytes())
            .with_context(|| format!("Invalid user header name '{}'", self.user_header))?;
        Ok(Settings {
            user_header,
            language: self.language.clone(),
        })
    }
}

/// Build the full application router.
pub fn build_router(state: Arc<AppState>, dev_mode: bool) -> Router {
    let mut app = api::api_router(state.clone())
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the tracker server.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    // Ensure parent directory exists for DB
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }

    let db = TrackerDb::new(&config.db_path).context("Failed to initialize tracker database")?;
    let store = AttachmentStore::new(&config.uploads_root);
    std::fs::create_dir_all(store.uploads_dir()).with_context(|| {
        format!(
            "Failed to create uploads directory {}",
            store.uploads_dir().display()
        )
    })?;

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        store,
        settings: config.settings()?,
    });
    let app = build_router(state, config.dev_mode);

    let host = if config.dev_mode { "0.0.0.0" } else { config.host.as_str() };
    let addr = format!("{}:{}", host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, db = %config.db_path.display(), "Tinyissue running");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
        return;
    }
    info!("Shutting down...");
}
