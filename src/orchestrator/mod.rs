pub mod events;
pub mod job;
pub mod state;

pub use events::JobEvent;
pub use job::{Callbacks, CompleteCallback, ErrorCallback, Job, JobBuilder, ProgressCallback};
pub use state::JobSnapshot;
