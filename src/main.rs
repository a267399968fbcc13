use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cmd;

#[derive(Parser)]
#[command(name = "tinyissue")]
#[command(version, about = "A small issue tracker")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to tinyissue.toml. Defaults to ./tinyissue.toml when present.
    #[arg(long, global = true, env = "TINYISSUE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server
    Serve {
        /// Port to serve on (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (permissive CORS, bind on all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and upload directory without starting the server
    Init {
        /// Database path (overrides the config file)
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
    /// Manage user accounts
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum UserCommands {
    /// Create a user
    Add {
        #[arg(long)]
        email: String,
        #[arg(long)]
        firstname: String,
        #[arg(long)]
        lastname: String,
        #[arg(long)]
        password: String,
        /// One of: user, developer, manager, administrator
        #[arg(long, default_value = "user")]
        role: String,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = cmd::load_config(cli.config.as_deref())?;
    tinyissue::logging::init(cli.verbose, config.app.log_format);
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    match &cli.command {
        Commands::Serve { port, dev } => cmd::cmd_serve(config, *port, *dev).await?,
        Commands::Init { db_path } => cmd::cmd_init(config, db_path.clone())?,
        Commands::User { command } => cmd::cmd_user(&config, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
