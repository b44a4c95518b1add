use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::PipelineError;
use crate::options::CameraMode;
use crate::stage::Stage;

/// File name of the working feature/match database inside the output directory.
pub const DATABASE_FILE: &str = "database.db";
/// Directory receiving every candidate model; the selected one lands in `sparse/0`.
pub const SPARSE_DIR: &str = "sparse";
/// Directory receiving the undistorted image set.
pub const UNDISTORTED_DIR: &str = "undistorted";
/// Prefix for output directories allocated when none is given.
pub const TEMP_PREFIX: &str = "sfm_";

/// Tunable parameters of a run, independent of where its files live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    pub camera_mode: CameraMode,
    pub camera_model: String,
    /// Matching selector, validated by the matching stage.
    pub match_type: String,
    pub max_image_size: u32,
    pub max_num_features: u32,
    /// Run the undistortion stage after reconstruction
    pub undistort: bool,
    /// Vocabulary tree forwarded to the `vocab_tree` matcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocab_tree_path: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            camera_mode: CameraMode::Auto,
            camera_model: "OPENCV".to_string(),
            match_type: "exhaustive".to_string(),
            max_image_size: 3200,
            max_num_features: 8192,
            undistort: true,
            vocab_tree_path: None,
        }
    }
}

/// Configuration of one reconstruction job.
///
/// Constructing it guarantees the output directory exists. After that the
/// value is never mutated; the worker thread shares it read-only. Whether the
/// image directory exists is checked by the extraction stage, not here.
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructionConfig {
    image_dir: PathBuf,
    output_dir: PathBuf,
    options: PipelineOptions,
    /// The output directory was allocated by us rather than supplied
    temporary_output: bool,
}

impl ReconstructionConfig {
    /// Build a configuration, creating or allocating the output directory.
    ///
    /// Fails with [`PipelineError::InvalidInput`] when `image_dir` is empty.
    pub fn new(
        image_dir: impl Into<PathBuf>,
        output_dir: Option<PathBuf>,
        options: PipelineOptions,
    ) -> Result<Self, PipelineError> {
        let image_dir = image_dir.into();
        if image_dir.as_os_str().is_empty() {
            return Err(PipelineError::InvalidInput(
                "image directory path is empty".to_string(),
            ));
        }

        let (output_dir, temporary_output) = match output_dir {
            Some(dir) => {
                std::fs::create_dir_all(&dir).map_err(|e| {
                    PipelineError::collaborator(
                        format!("Failed to create output directory {}", dir.display()),
                        e,
                    )
                })?;
                (dir, false)
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix(TEMP_PREFIX)
                    .tempdir()
                    .map_err(|e| {
                        PipelineError::collaborator("Failed to allocate output directory", e)
                    })?
                    .keep();
                (dir, true)
            }
        };

        Ok(Self {
            image_dir,
            output_dir,
            options,
            temporary_output,
        })
    }

    /// Configuration with default options.
    pub fn with_defaults(
        image_dir: impl Into<PathBuf>,
        output_dir: Option<PathBuf>,
    ) -> Result<Self, PipelineError> {
        Self::new(image_dir, output_dir, PipelineOptions::default())
    }

    pub fn image_dir(&self) -> &Path {
        &self.image_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn is_temporary_output(&self) -> bool {
        self.temporary_output
    }

    pub fn camera_mode(&self) -> CameraMode {
        self.options.camera_mode
    }

    pub fn camera_model(&self) -> &str {
        &self.options.camera_model
    }

    pub fn match_type(&self) -> &str {
        &self.options.match_type
    }

    pub fn max_image_size(&self) -> u32 {
        self.options.max_image_size
    }

    pub fn max_num_features(&self) -> u32 {
        self.options.max_num_features
    }

    pub fn undistort(&self) -> bool {
        self.options.undistort
    }

    pub fn vocab_tree_path(&self) -> Option<&Path> {
        self.options.vocab_tree_path.as_deref()
    }

    /// `{output}/database.db`
    pub fn database_path(&self) -> PathBuf {
        self.output_dir.join(DATABASE_FILE)
    }

    /// `{output}/sparse`
    pub fn sparse_path(&self) -> PathBuf {
        self.output_dir.join(SPARSE_DIR)
    }

    /// `{output}/sparse/0`, where the selected model is written.
    pub fn model_path(&self) -> PathBuf {
        self.sparse_path().join("0")
    }

    /// `{output}/undistorted`
    pub fn undistorted_path(&self) -> PathBuf {
        self.output_dir.join(UNDISTORTED_DIR)
    }

    /// Working stages this configuration runs, in order.
    pub fn stage_plan(&self) -> Vec<Stage> {
        Stage::WORKING
            .into_iter()
            .filter(|stage| *stage != Stage::Undistorting || self.options.undistort)
            .collect()
    }
}
