//! User management commands (`tinyissue user`).

use anyhow::{Context, Result, anyhow};
use tinyissue::config::TinyissueToml;
use tinyissue::tracker::db::TrackerDb;
use tinyissue::tracker::models::{NewUser, Role};

use crate::UserCommands;

pub fn cmd_user(config: &TinyissueToml, command: UserCommands) -> Result<()> {
    match command {
        UserCommands::Add {
            email,
            firstname,
            lastname,
            password,
            role,
        } => {
            let role: Role = role.parse().map_err(|e: String| anyhow!(e))?;
            if password.is_empty() {
                anyhow::bail!("Password must not be empty");
            }
            let db = TrackerDb::new(&config.server.db_path).with_context(|| {
                format!(
                    "Failed to open database at {}. Run 'tinyissue init' first.",
                    config.server.db_path.display()
                )
            })?;
            let user = db.create_user(
                &NewUser {
                    email,
                    firstname,
                    lastname,
                    role,
                    private: false,
                    password,
                    status: 1,
                },
                &config.app.language,
            )?;
            println!(
                "Created user #{} {} <{}> ({})",
                user.id,
                user.fullname(),
                user.email,
                user.role.as_str()
            );
        }
    }
    Ok(())
}
