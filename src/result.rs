//! Outcome record of a reconstruction run.
//!
//! A successful result carries the selected model's location and statistics;
//! a failed one carries only the error message. Results are assembled on the
//! worker thread by a [`ResultBuilder`] and frozen before anyone else sees them.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Summary statistics of a reconstructed model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelStats {
    pub num_cameras: usize,
    pub num_images: usize,
    pub num_points: usize,
    pub mean_reproj_error: f64,
}

/// Result of a completed or failed reconstruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconstructionResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparse_path: Option<PathBuf>,
    /// Present only when the undistortion stage ran
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undistorted_path: Option<PathBuf>,
    pub num_cameras: usize,
    pub num_images: usize,
    pub num_points: usize,
    pub mean_reproj_error: f64,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReconstructionResult {
    /// Create a successful result for the model written at `sparse_path`.
    pub fn success(sparse_path: PathBuf, stats: ModelStats) -> Self {
        Self {
            success: true,
            sparse_path: Some(sparse_path),
            undistorted_path: None,
            num_cameras: stats.num_cameras,
            num_images: stats.num_images,
            num_points: stats.num_points,
            mean_reproj_error: stats.mean_reproj_error,
            warnings: Vec::new(),
            error: None,
        }
    }

    /// Create a failed result.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            sparse_path: None,
            undistorted_path: None,
            num_cameras: 0,
            num_images: 0,
            num_points: 0,
            mean_reproj_error: 0.0,
            warnings: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn stats(&self) -> ModelStats {
        ModelStats {
            num_cameras: self.num_cameras,
            num_images: self.num_images,
            num_points: self.num_points,
            mean_reproj_error: self.mean_reproj_error,
        }
    }
}

/// Accumulates the pieces of a successful run as stages complete.
///
/// Owned by the worker thread alone; [`ResultBuilder::finish`] consumes it, so
/// a half-populated result can never escape.
#[derive(Debug, Default)]
pub struct ResultBuilder {
    images_extracted: Option<usize>,
    model: Option<ReconstructionResult>,
    undistorted_path: Option<PathBuf>,
    warnings: Vec<String>,
}

impl ResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn images_extracted(&mut self, count: usize) {
        self.images_extracted = Some(count);
    }

    /// Record the reconstruction stage's (successful) result.
    pub fn model(&mut self, result: ReconstructionResult) {
        if let Some(extracted) = self.images_extracted
            && result.num_images < extracted
        {
            self.warnings.push(format!(
                "Only {} of {} images were registered in the reconstruction",
                result.num_images, extracted
            ));
        }
        self.model = Some(result);
    }

    pub fn undistorted(&mut self, path: PathBuf) {
        self.undistorted_path = Some(path);
    }

    /// Freeze the accumulated state into a result.
    ///
    /// Without a recorded model the result is a failure, never a success with
    /// empty fields.
    pub fn finish(self) -> ReconstructionResult {
        let Some(mut result) = self.model else {
            return ReconstructionResult::failure("Reconstruction stage did not run");
        };
        if self.undistorted_path.is_some() {
            result.undistorted_path = self.undistorted_path;
        }
        result.warnings.extend(self.warnings);
        result
    }
}
