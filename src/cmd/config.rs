//! Configuration view and validation commands (`tinyissue config`).

use std::path::Path;

use anyhow::Result;
use tinyissue::config::TinyissueToml;
use tracing::warn;

use crate::ConfigCommands;

/// Load the configuration from `path`, or from the current directory, then
/// apply environment overrides.
pub fn load_config(path: Option<&Path>) -> Result<TinyissueToml> {
    let mut config = match path {
        Some(path) => TinyissueToml::load(path)?,
        None => TinyissueToml::load_or_default(&std::env::current_dir()?)?,
    };
    config.apply_env();
    Ok(config)
}

pub fn cmd_config(config: &TinyissueToml, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("Tinyissue Configuration");
            println!("=======================");
            println!();
            println!("[server]");
            println!("  host = \"{}\"", config.server.host);
            println!("  port = {}", config.server.port);
            println!("  db_path = \"{}\"", config.server.db_path.display());
            println!("  dev_mode = {}", config.server.dev_mode);
            println!();
            println!("[storage]");
            println!("  uploads_root = \"{}\"", config.storage.uploads_root.display());
            println!();
            println!("[app]");
            println!("  language = \"{}\"", config.app.language);
            println!("  user_header = \"{}\"", config.app.user_header);
            println!("  log_format = \"{:?}\"", config.app.log_format);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                for warning in &warnings {
                    warn!("{}", warning);
                    println!("Warning: {}", warning);
                }
            }
        }
    }
    Ok(())
}
