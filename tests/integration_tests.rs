//! Integration tests for the tinyissue binary.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a tinyissue Command isolated from the caller's environment
fn tinyissue() -> Command {
    let mut cmd = cargo_bin_cmd!("tinyissue");
    cmd.env_remove("TINYISSUE_CONFIG")
        .env_remove("TINYISSUE_PORT")
        .env_remove("TINYISSUE_DB")
        .env_remove("TINYISSUE_UPLOADS");
    cmd
}

/// Helper to initialize a database in a temp directory
fn init_tracker(dir: &TempDir) {
    tinyissue()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_tinyissue_help() {
        tinyissue()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"));
    }

    #[test]
    fn test_tinyissue_version() {
        tinyissue().arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        tinyissue().arg("frobnicate").assert().failure();
    }
}

// =============================================================================
// Init Tests
// =============================================================================

mod init {
    use super::*;

    #[test]
    fn test_init_creates_database_and_uploads() {
        let dir = TempDir::new().unwrap();

        tinyissue()
            .current_dir(dir.path())
            .arg("init")
            .assert()
            .success()
            .stdout(predicate::str::contains("database initialized"));

        assert!(dir.path().join("storage/tinyissue.db").exists());
        assert!(dir.path().join("storage/uploads").is_dir());
    }

    #[test]
    fn test_init_idempotent() {
        let dir = TempDir::new().unwrap();
        init_tracker(&dir);
        init_tracker(&dir);
        assert!(dir.path().join("storage/tinyissue.db").exists());
    }

    #[test]
    fn test_init_with_custom_db_path() {
        let dir = TempDir::new().unwrap();

        tinyissue()
            .current_dir(dir.path())
            .args(["init", "--db-path", "data/custom.db"])
            .assert()
            .success();

        assert!(dir.path().join("data/custom.db").exists());
    }

    #[test]
    fn test_init_honours_config_file() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tinyissue.toml"),
            "[server]\ndb_path = \"db/from-config.db\"\n\n[storage]\nuploads_root = \"files\"\n",
        )
        .unwrap();

        init_tracker(&dir);

        assert!(dir.path().join("db/from-config.db").exists());
        assert!(dir.path().join("files/uploads").is_dir());
    }

    #[test]
    fn test_init_honours_env_override() {
        let dir = TempDir::new().unwrap();

        tinyissue()
            .current_dir(dir.path())
            .env("TINYISSUE_DB", "env/tracker.db")
            .arg("init")
            .assert()
            .success();

        assert!(dir.path().join("env/tracker.db").exists());
    }
}

// =============================================================================
// User Tests
// =============================================================================

mod user {
    use super::*;

    fn add_user(dir: &TempDir, email: &str, role: &str) -> assert_cmd::assert::Assert {
        tinyissue()
            .current_dir(dir.path())
            .args([
                "user",
                "add",
                "--email",
                email,
                "--firstname",
                "Ada",
                "--lastname",
                "Lovelace",
                "--password",
                "secret",
                "--role",
                role,
            ])
            .assert()
    }

    #[test]
    fn test_user_add_creates_administrator() {
        let dir = TempDir::new().unwrap();
        init_tracker(&dir);

        add_user(&dir, "ada@example.com", "administrator")
            .success()
            .stdout(predicate::str::contains("Ada Lovelace"))
            .stdout(predicate::str::contains("ada@example.com"))
            .stdout(predicate::str::contains("administrator"));
    }

    #[test]
    fn test_user_add_defaults_to_user_role() {
        let dir = TempDir::new().unwrap();
        init_tracker(&dir);

        tinyissue()
            .current_dir(dir.path())
            .args([
                "user",
                "add",
                "--email",
                "bob@example.com",
                "--firstname",
                "Bob",
                "--lastname",
                "Smith",
                "--password",
                "pw",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("(user)"));
    }

    #[test]
    fn test_user_add_rejects_unknown_role() {
        let dir = TempDir::new().unwrap();
        init_tracker(&dir);

        add_user(&dir, "eve@example.com", "overlord").failure();
    }

    #[test]
    fn test_user_add_rejects_empty_password() {
        let dir = TempDir::new().unwrap();
        init_tracker(&dir);

        tinyissue()
            .current_dir(dir.path())
            .args([
                "user",
                "add",
                "--email",
                "x@example.com",
                "--firstname",
                "X",
                "--lastname",
                "Y",
                "--password",
                "",
            ])
            .assert()
            .failure();
    }

    #[test]
    fn test_user_add_requires_email() {
        tinyissue()
            .args(["user", "add", "--firstname", "A", "--lastname", "B"])
            .assert()
            .failure();
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_show_defaults() {
        let dir = TempDir::new().unwrap();

        tinyissue()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 8080"))
            .stdout(predicate::str::contains("x-tinyissue-user"));
    }

    #[test]
    fn test_config_show_reads_file() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tinyissue.toml"), "[server]\nport = 9191\n").unwrap();

        tinyissue()
            .current_dir(dir.path())
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("port = 9191"));
    }

    #[test]
    fn test_config_flag_points_at_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("other.toml");
        fs::write(&path, "[app]\nlanguage = \"fr\"\n").unwrap();

        tinyissue()
            .args(["config", "show", "--config"])
            .arg(&path)
            .assert()
            .success()
            .stdout(predicate::str::contains("language = \"fr\""));
    }

    #[test]
    fn test_config_validate_clean() {
        let dir = TempDir::new().unwrap();

        tinyissue()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_config_validate_reports_warnings() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("tinyissue.toml"),
            "[app]\nuser_header = \"bad header\"\n",
        )
        .unwrap();

        tinyissue()
            .current_dir(dir.path())
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("not a valid HTTP header name"));
    }

    #[test]
    fn test_invalid_toml_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("tinyissue.toml"), "[server\nport = ").unwrap();

        tinyissue()
            .current_dir(dir.path())
            .args(["config", "show"])
            .assert()
            .failure();
    }

    #[test]
    fn test_missing_config_file_fails() {
        tinyissue()
            .args(["config", "show", "--config", "/nonexistent/tinyissue.toml"])
            .assert()
            .failure();
    }
}
