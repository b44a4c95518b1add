//! Layered configuration from `sfm.toml`.
//!
//! Values are resolved file → environment → CLI. The file is looked up at an
//! explicit `--config` path, then `./sfm.toml`, then
//! `<config dir>/sfm-runner/sfm.toml`; without any of them the built-in
//! defaults apply.
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! program = "colmap"
//!
//! [defaults]
//! camera_mode = "AUTO"
//! camera_model = "OPENCV"
//! match_type = "exhaustive"
//! max_image_size = 3200
//! max_num_features = 8192
//! undistort = true
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::backend::colmap::DEFAULT_PROGRAM;
use crate::config::PipelineOptions;
use crate::options::{MatchStrategy, is_known_camera_model};

/// File name searched for in the working and user config directories.
pub const CONFIG_FILE: &str = "sfm.toml";

/// Environment variable overriding the backend executable.
pub const PROGRAM_ENV: &str = "COLMAP_CMD";

/// External tool settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSection {
    /// Executable to run (default: "colmap")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
}

/// Contents of `sfm.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSection,
    /// Run options used when the command line does not override them
    #[serde(default)]
    pub defaults: PipelineOptions,
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse sfm.toml")
    }

    /// Locate the settings file to use, if any.
    ///
    /// An explicit path is returned as-is so that a missing file surfaces as
    /// an error when loading.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        dirs::config_dir()
            .map(|dir| dir.join("sfm-runner").join(CONFIG_FILE))
            .filter(|path| path.is_file())
    }

    /// Load the located file, or defaults when there is none.
    ///
    /// Returns the path the settings came from alongside them.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        match Self::locate(explicit) {
            Some(path) => {
                let settings = Self::load(&path)?;
                Ok((settings, Some(path)))
            }
            None => Ok((Self::default(), None)),
        }
    }

    /// Save settings to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize sfm.toml")?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Backend executable (`COLMAP_CMD` → file → default).
    pub fn program(&self) -> String {
        resolve_program(
            std::env::var(PROGRAM_ENV).ok(),
            self.backend.program.as_deref(),
        )
    }

    /// Validate the settings and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        let defaults = &self.defaults;

        let strategy = defaults.match_type.parse::<MatchStrategy>();
        if strategy.is_err() {
            warnings.push(format!(
                "Unknown match_type '{}': expected one of {}",
                defaults.match_type,
                MatchStrategy::ALL.map(|m| m.as_str()).join(", ")
            ));
        }

        if !is_known_camera_model(&defaults.camera_model) {
            warnings.push(format!(
                "Unknown camera_model '{}'",
                defaults.camera_model
            ));
        }

        if defaults.max_image_size == 0 {
            warnings.push("max_image_size is 0: images would be scaled to nothing".to_string());
        }
        if defaults.max_num_features == 0 {
            warnings.push("max_num_features is 0: no features would be extracted".to_string());
        }

        if let Some(tree) = &defaults.vocab_tree_path {
            if !matches!(strategy, Ok(MatchStrategy::VocabTree)) {
                warnings.push(format!(
                    "vocab_tree_path is set but match_type is '{}'",
                    defaults.match_type
                ));
            }
            if !tree.is_file() {
                warnings.push(format!("vocab_tree_path does not exist: {}", tree.display()));
            }
        }

        if let Some(program) = &self.backend.program
            && program.trim().is_empty()
        {
            warnings.push("backend.program is empty".to_string());
        }

        warnings
    }
}

fn resolve_program(env: Option<String>, file: Option<&str>) -> String {
    env.filter(|value| !value.trim().is_empty())
        .or_else(|| file.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_PROGRAM.to_string())
}
