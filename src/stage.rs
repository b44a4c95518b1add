//! Pipeline stage enumeration.
//!
//! `Stage` is both the job's state and the label attached to every progress
//! report. The four working stages run in a fixed order; `Done`, `Error` and
//! `Cancelled` are terminal.

use serde::{Deserialize, Serialize};

/// Execution stage of a reconstruction job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Job constructed but not started
    #[default]
    Idle,
    /// Detecting features in the input images
    Extracting,
    /// Computing pairwise correspondences
    Matching,
    /// Incremental structure-from-motion
    Reconstructing,
    /// Writing undistorted images for the selected model
    Undistorting,
    /// Finished successfully
    Done,
    /// Finished with a failure
    Error,
    /// Stopped at a stage boundary on request
    Cancelled,
}

impl Stage {
    /// The working stages in execution order.
    pub const WORKING: [Stage; 4] = [
        Stage::Extracting,
        Stage::Matching,
        Stage::Reconstructing,
        Stage::Undistorting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Extracting => "extracting",
            Stage::Matching => "matching",
            Stage::Reconstructing => "reconstructing",
            Stage::Undistorting => "undistorting",
            Stage::Done => "done",
            Stage::Error => "error",
            Stage::Cancelled => "cancelled",
        }
    }

    /// Check if the stage is one of the working stages.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            Stage::Extracting | Stage::Matching | Stage::Reconstructing | Stage::Undistorting
        )
    }

    /// Check if the job has finished in this stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Error | Stage::Cancelled)
    }

    /// Status text published when a working stage begins.
    pub(crate) fn entering_message(&self) -> &'static str {
        match self {
            Stage::Extracting => "Extracting features...",
            Stage::Matching => "Matching features...",
            Stage::Reconstructing => "Reconstructing...",
            Stage::Undistorting => "Undistorting images...",
            Stage::Idle => "",
            Stage::Done => "Complete",
            Stage::Error => "Error",
            Stage::Cancelled => "Cancelled",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage boundary `index` of a plan with `count` stages.
///
/// Boundaries divide 0–100 evenly; the last boundary is exactly 100.
pub fn boundary(index: usize, count: usize) -> f64 {
    if count == 0 || index >= count {
        return 100.0;
    }
    100.0 * index as f64 / count as f64
}
