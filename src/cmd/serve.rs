//! Web server command (`tinyissue serve`).

use anyhow::Result;
use tinyissue::config::TinyissueToml;
use tinyissue::tracker::server::{ServerConfig, start_server};

pub async fn cmd_serve(toml: TinyissueToml, port: Option<u16>, dev: bool) -> Result<()> {
    let mut config = ServerConfig::from(&toml);
    if let Some(port) = port {
        config.port = port;
    }
    config.dev_mode |= dev;
    start_server(config).await
}
