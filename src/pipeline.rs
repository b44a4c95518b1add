//! One-call entry points over [`Job`].

use std::path::PathBuf;
use std::sync::Arc;

use crate::backend::Backend;
use crate::config::{PipelineOptions, ReconstructionConfig};
use crate::errors::PipelineError;
use crate::orchestrator::job::run_inline;
use crate::orchestrator::{Callbacks, Job, ProgressCallback};
use crate::result::ReconstructionResult;

/// Run the whole pipeline on the calling thread.
///
/// Never fails: configuration errors and stage failures come back as a
/// result with `success == false`.
pub fn run_pipeline(
    image_dir: impl Into<PathBuf>,
    output_dir: Option<PathBuf>,
    options: PipelineOptions,
    backend: Arc<dyn Backend>,
    on_progress: Option<ProgressCallback>,
) -> ReconstructionResult {
    let config = match ReconstructionConfig::new(image_dir, output_dir, options) {
        Ok(config) => config,
        Err(e) => return ReconstructionResult::failure(e.to_string()),
    };
    let callbacks = Callbacks {
        on_progress,
        ..Callbacks::default()
    };
    run_inline(config, backend, callbacks)
}

/// Build a job and start it in the background.
pub fn run_pipeline_async(
    image_dir: impl Into<PathBuf>,
    output_dir: Option<PathBuf>,
    options: PipelineOptions,
    backend: Arc<dyn Backend>,
    callbacks: Callbacks,
) -> Result<Job, PipelineError> {
    let config = ReconstructionConfig::new(image_dir, output_dir, options)?;
    let job = Job::builder(config)
        .backend(backend)
        .callbacks(callbacks)
        .build();
    job.start()?;
    Ok(job)
}
