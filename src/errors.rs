//! Typed error hierarchy for the reconstruction pipeline.
//!
//! `PipelineError` covers every failure a job can report:
//! - input problems detected while building a configuration or enumerating images
//! - stage-level failures raised by the backend
//! - misuse of the job API
//!
//! The enum is `Clone` so one value can be handed to the error callback and
//! fanned out to every event subscriber.

use std::path::PathBuf;
use thiserror::Error;

/// Coarse classification of a [`PipelineError`], convenient for matching in
/// consumers that only care about the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    NoImagesFound,
    UnknownMatchStrategy,
    NoValidReconstruction,
    CollaboratorFailure,
    AlreadyStarted,
}

/// Errors from configuration, stage execution and the job API.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No images found in {}", dir.display())]
    NoImagesFound { dir: PathBuf },

    #[error("Unknown match type: {0}")]
    UnknownMatchStrategy(String),

    #[error("No valid reconstructions found")]
    NoValidReconstruction,

    /// Any backend, library or I/O failure, message surfaced verbatim.
    #[error("{0}")]
    Collaborator(String),

    #[error("Job already started")]
    AlreadyStarted,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) => ErrorKind::InvalidInput,
            PipelineError::NoImagesFound { .. } => ErrorKind::NoImagesFound,
            PipelineError::UnknownMatchStrategy(_) => ErrorKind::UnknownMatchStrategy,
            PipelineError::NoValidReconstruction => ErrorKind::NoValidReconstruction,
            PipelineError::Collaborator(_) => ErrorKind::CollaboratorFailure,
            PipelineError::AlreadyStarted => ErrorKind::AlreadyStarted,
        }
    }

    /// Build a collaborator failure with a short context prefix.
    pub fn collaborator(context: impl std::fmt::Display, detail: impl std::fmt::Display) -> Self {
        PipelineError::Collaborator(format!("{}: {}", context, detail))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Collaborator(err.to_string())
    }
}

impl From<rusqlite::Error> for PipelineError {
    fn from(err: rusqlite::Error) -> Self {
        PipelineError::Collaborator(format!("Database error: {}", err))
    }
}
