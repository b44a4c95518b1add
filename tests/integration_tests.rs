//! Integration tests for the sfm-runner binary
//!
//! These tests drive the CLI end to end. None of them require a COLMAP
//! installation: runs either fail before a backend process is launched or
//! point at a program that does not exist.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MISSING_PROGRAM: &str = "sfm-runner-no-such-program";

/// Helper to create an sfm-runner Command isolated from the user's config
fn sfm(home: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("sfm-runner");
    cmd.current_dir(home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env_remove("COLMAP_CMD")
        .env_remove("RUST_LOG");
    cmd
}

fn write_images(dir: &Path, names: &[&str]) {
    fs::create_dir_all(dir).unwrap();
    for name in names {
        fs::write(dir.join(name), b"image").unwrap();
    }
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_sfm_help() {
        let home = TempDir::new().unwrap();
        sfm(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("run"))
            .stdout(predicate::str::contains("images"));
    }

    #[test]
    fn test_sfm_version() {
        let home = TempDir::new().unwrap();
        sfm(&home).arg("--version").assert().success();
    }

    #[test]
    fn test_run_requires_image_dir() {
        let home = TempDir::new().unwrap();
        sfm(&home).arg("run").assert().failure();
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_creates_file() {
        let home = TempDir::new().unwrap();

        sfm(&home)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created sfm.toml"));

        let content = fs::read_to_string(home.path().join("sfm.toml")).unwrap();
        assert!(content.contains("[defaults]"));
        assert!(content.contains("match_type = \"exhaustive\""));
    }

    #[test]
    fn test_config_init_keeps_existing_file() {
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("sfm.toml"), "[defaults]\nmax_image_size = 800\n").unwrap();

        sfm(&home)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));

        let content = fs::read_to_string(home.path().join("sfm.toml")).unwrap();
        assert!(content.contains("max_image_size = 800"));
    }

    #[test]
    fn test_config_show_defaults() {
        let home = TempDir::new().unwrap();

        sfm(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No sfm.toml found"))
            .stdout(predicate::str::contains("camera_model = \"OPENCV\""))
            .stdout(predicate::str::contains("program = \"colmap\""));
    }

    #[test]
    fn test_config_show_reflects_program_env() {
        let home = TempDir::new().unwrap();

        sfm(&home)
            .env("COLMAP_CMD", "/opt/colmap/bin/colmap")
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("program = \"/opt/colmap/bin/colmap\""));
    }

    #[test]
    fn test_config_validate_without_file() {
        let home = TempDir::new().unwrap();

        sfm(&home)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Using defaults (valid)"));
    }

    #[test]
    fn test_config_validate_reports_unknown_match_type() {
        let home = TempDir::new().unwrap();
        fs::write(
            home.path().join("sfm.toml"),
            "[defaults]\nmatch_type = \"transitive\"\n",
        )
        .unwrap();

        sfm(&home)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration warnings"))
            .stdout(predicate::str::contains("Unknown match_type 'transitive'"));
    }

    #[test]
    fn test_config_validate_accepts_generated_file() {
        let home = TempDir::new().unwrap();
        sfm(&home).args(["config", "init"]).assert().success();

        sfm(&home)
            .args(["config", "validate"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration is valid."));
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let home = TempDir::new().unwrap();
        fs::write(home.path().join("sfm.toml"), "[defaults\n").unwrap();

        sfm(&home).args(["config", "show"]).assert().failure();
    }
}

// =============================================================================
// Image Listing Tests
// =============================================================================

mod images {
    use super::*;

    #[test]
    fn test_images_lists_accepted_files() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join("photos");
        write_images(&dir, &["a.png", "b.PNG", "c.jpg", "notes.txt"]);

        sfm(&home)
            .args(["images", "photos"])
            .assert()
            .success()
            .stdout(predicate::str::contains("a.png"))
            .stdout(predicate::str::contains("3 images"))
            .stdout(predicate::str::contains("notes.txt").not());
    }

    #[test]
    fn test_images_json_output() {
        let home = TempDir::new().unwrap();
        let dir = home.path().join("photos");
        write_images(&dir, &["a.jpeg", "b.jpg"]);

        let output = sfm(&home)
            .args(["images", "photos", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let listed: Vec<String> = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[test]
    fn test_images_empty_directory() {
        let home = TempDir::new().unwrap();
        fs::create_dir(home.path().join("photos")).unwrap();

        sfm(&home)
            .args(["images", "photos"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No images found"));
    }

    #[test]
    fn test_images_missing_directory_fails() {
        let home = TempDir::new().unwrap();

        sfm(&home)
            .args(["images", "nowhere"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("does not exist"));
    }
}

// =============================================================================
// Run Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_empty_directory_fails_and_writes_record() {
        let home = TempDir::new().unwrap();
        fs::create_dir(home.path().join("photos")).unwrap();

        sfm(&home)
            .args(["run", "photos", "--output", "out", "--program", MISSING_PROGRAM])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No images found"));

        let record: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(home.path().join("out/run.json")).unwrap())
                .unwrap();
        assert_eq!(record["stage"], "error");
        assert_eq!(record["error_kind"], "no_images_found");
        assert_eq!(record["config"]["program"], MISSING_PROGRAM);
    }

    #[test]
    fn test_run_reports_unlaunchable_program() {
        let home = TempDir::new().unwrap();
        write_images(&home.path().join("photos"), &["a.jpg", "b.jpg"]);

        sfm(&home)
            .args(["run", "photos", "-o", "out", "--program", MISSING_PROGRAM])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to launch"));

        assert!(home.path().join("out/run.json").is_file());
    }

    #[test]
    fn test_run_json_prints_record() {
        let home = TempDir::new().unwrap();
        fs::create_dir(home.path().join("photos")).unwrap();

        let output = sfm(&home)
            .args(["run", "photos", "-o", "out", "--json", "--program", MISSING_PROGRAM])
            .output()
            .unwrap();
        assert!(!output.status.success());
        let record: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(record["stage"], "error");
        assert!(record["run_id"].is_string());
    }

    #[test]
    fn test_run_rejects_invalid_camera_mode() {
        let home = TempDir::new().unwrap();
        write_images(&home.path().join("photos"), &["a.jpg"]);

        sfm(&home)
            .args(["run", "photos", "-o", "out", "--camera-mode", "bogus"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid camera mode"));
    }

    #[test]
    fn test_run_launch_failure_names_first_subcommand() {
        let home = TempDir::new().unwrap();
        write_images(&home.path().join("photos"), &["a.jpg"]);

        // Extraction runs before the match type is looked at
        sfm(&home)
            .args([
                "run",
                "photos",
                "-o",
                "out",
                "--match-type",
                "transitive",
                "--program",
                MISSING_PROGRAM,
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("feature_extractor"));
    }
}
