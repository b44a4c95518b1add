//! Stage functions of the reconstruction pipeline.
//!
//! The orchestrator treats a [`Backend`] as opaque: each method is one
//! synchronous, blocking unit of work that either returns or fails with a
//! descriptive [`PipelineError`]. [`ColmapCli`] is the production
//! implementation; tests substitute their own.

pub mod colmap;
pub mod database;
pub mod model;

pub use colmap::ColmapCli;
pub use model::{CandidateModel, select_largest};

use crate::config::ReconstructionConfig;
use crate::errors::PipelineError;
use crate::result::ReconstructionResult;

/// Fine-grained progress inside one stage: `(current, total, message)`.
pub type StageProgress<'a> = &'a (dyn Fn(u64, u64, &str) + Sync);

/// A progress sink that drops every report.
pub fn no_progress(_current: u64, _total: u64, _message: &str) {}

/// The four stage contracts consumed by the orchestrator.
pub trait Backend: Send + Sync {
    /// Detect features in every input image and record them in the working
    /// database. Returns the number of images processed.
    ///
    /// Fails with [`PipelineError::NoImagesFound`] when the image directory
    /// holds no accepted images.
    fn extract(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<usize, PipelineError>;

    /// Compute pairwise correspondences with the configured strategy.
    /// Returns the number of matches stored.
    ///
    /// Fails with [`PipelineError::UnknownMatchStrategy`] for an unrecognised selector.
    fn match_features(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<u64, PipelineError>;

    /// Run incremental mapping, keep the model with the most registered
    /// images and write it to [`ReconstructionConfig::model_path`].
    ///
    /// Finding no usable model is a normal outcome: the returned result has
    /// `success == false` and the message "No valid reconstructions found".
    fn reconstruct(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<ReconstructionResult, PipelineError>;

    /// Write undistorted images for the model at
    /// [`ReconstructionConfig::model_path`], which the reconstruction stage
    /// must have produced.
    fn undistort(
        &self,
        config: &ReconstructionConfig,
        progress: StageProgress<'_>,
    ) -> Result<(), PipelineError>;
}
