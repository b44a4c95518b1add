//! Configuration view and validation commands: `sfm-runner config`.

use anyhow::Result;
use std::path::PathBuf;

use super::super::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    use sfm_runner::settings::{CONFIG_FILE, PROGRAM_ENV, Settings};

    match command {
        None | Some(ConfigCommands::Show) => {
            let (settings, source) = Settings::load_or_default(cli.config.as_deref())?;

            println!();
            println!("sfm-runner Configuration");
            println!("========================");
            println!();
            match &source {
                Some(path) => println!("Config file: {}", path.display()),
                None => println!("No {} found, using defaults.", CONFIG_FILE),
            }
            println!();

            let defaults = &settings.defaults;
            println!("[backend]");
            if let Some(program) = &settings.backend.program {
                println!("  program = \"{}\"", program);
            }
            println!();
            println!("[defaults]");
            println!("  camera_mode = \"{}\"", defaults.camera_mode);
            println!("  camera_model = \"{}\"", defaults.camera_model);
            println!("  match_type = \"{}\"", defaults.match_type);
            println!("  max_image_size = {}", defaults.max_image_size);
            println!("  max_num_features = {}", defaults.max_num_features);
            println!("  undistort = {}", defaults.undistort);
            if let Some(tree) = &defaults.vocab_tree_path {
                println!("  vocab_tree_path = \"{}\"", tree.display());
            }
            println!();

            println!("Effective values (with env overrides):");
            println!("  program = \"{}\" ({} → file → default)", settings.program(), PROGRAM_ENV);
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let (settings, source) = Settings::load_or_default(cli.config.as_deref())?;
            if source.is_none() {
                println!("No {} found. Using defaults (valid).", CONFIG_FILE);
                return Ok(());
            }

            let warnings = settings.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = cli
                .config
                .clone()
                .unwrap_or_else(|| PathBuf::from(CONFIG_FILE));
            if config_path.exists() {
                println!("{} already exists at {}", CONFIG_FILE, config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            Settings::default().save(&config_path)?;

            println!("Created {} at {}", CONFIG_FILE, config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [backend] program");
            println!("  - [defaults] camera_mode, camera_model, match_type, max_image_size,");
            println!("    max_num_features, undistort, vocab_tree_path");
            println!();
        }
    }

    Ok(())
}
