pub mod audit;
pub mod backend;
pub mod config;
pub mod errors;
pub mod images;
pub mod options;
pub mod orchestrator;
pub mod pipeline;
pub mod result;
pub mod settings;
pub mod stage;
pub mod ui;

pub use config::{PipelineOptions, ReconstructionConfig};
pub use errors::{ErrorKind, PipelineError};
pub use orchestrator::{Job, JobBuilder, JobEvent};
pub use pipeline::{run_pipeline, run_pipeline_async};
pub use result::ReconstructionResult;
pub use stage::Stage;
