//! Background reconstruction job.
//!
//! A [`Job`] owns one worker thread that runs the configured stage plan in
//! order. Cancellation is a flag checked before each stage, in the same
//! critical section that publishes the stage as entered; a stage that is
//! already running always completes. Callbacks and events are delivered from
//! the worker with the state lock released.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::events::JobEvent;
use super::state::{JobSnapshot, Shared};
use crate::backend::{Backend, ColmapCli};
use crate::config::ReconstructionConfig;
use crate::errors::PipelineError;
use crate::result::{ReconstructionResult, ResultBuilder};
use crate::stage::{Stage, boundary};

pub type ProgressCallback = Box<dyn Fn(Stage, f64, &str) + Send + Sync>;
pub type CompleteCallback = Box<dyn Fn(&ReconstructionResult) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&PipelineError) + Send + Sync>;

/// Consumer hooks, all optional.
#[derive(Default)]
pub struct Callbacks {
    /// `(stage, percent, status)` on every state publication, terminal ones included
    pub on_progress: Option<ProgressCallback>,
    /// Once, when the run reaches `Done`
    pub on_complete: Option<CompleteCallback>,
    /// Once, when the run reaches `Error`
    pub on_error: Option<ErrorCallback>,
}

impl std::fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_progress", &self.on_progress.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Builder for a [`Job`].
pub struct JobBuilder {
    config: ReconstructionConfig,
    backend: Option<Arc<dyn Backend>>,
    callbacks: Callbacks,
}

impl JobBuilder {
    pub fn new(config: ReconstructionConfig) -> Self {
        Self {
            config,
            backend: None,
            callbacks: Callbacks::default(),
        }
    }

    /// Stage implementation. Defaults to [`ColmapCli`] with the default program.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn on_progress(mut self, f: impl Fn(Stage, f64, &str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_progress = Some(Box::new(f));
        self
    }

    pub fn on_complete(mut self, f: impl Fn(&ReconstructionResult) + Send + Sync + 'static) -> Self {
        self.callbacks.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&PipelineError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Box::new(f));
        self
    }

    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn build(self) -> Job {
        let backend = self
            .backend
            .unwrap_or_else(|| Arc::new(ColmapCli::default()));
        let config = Arc::new(self.config);
        let shared = Arc::new(Shared::default());
        Job {
            launch: Mutex::new(Some(Worker {
                shared: Arc::clone(&shared),
                config: Arc::clone(&config),
                backend,
                callbacks: self.callbacks,
                delivery: Mutex::new(()),
            })),
            handle: Mutex::new(None),
            shared,
            config,
        }
    }
}

/// A reconstruction job running on its own worker thread.
///
/// Every accessor takes `&self`; share the job behind an `Arc` to cancel it
/// from another thread.
pub struct Job {
    shared: Arc<Shared>,
    config: Arc<ReconstructionConfig>,
    /// Taken by the first `start()`
    launch: Mutex<Option<Worker>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Job {
    /// Job with the default backend and no callbacks.
    pub fn new(config: ReconstructionConfig) -> Self {
        JobBuilder::new(config).build()
    }

    pub fn builder(config: ReconstructionConfig) -> JobBuilder {
        JobBuilder::new(config)
    }

    pub fn config(&self) -> &ReconstructionConfig {
        &self.config
    }

    /// Launch the worker thread.
    ///
    /// Fails with [`PipelineError::AlreadyStarted`] on every call after the
    /// first; no second worker is spawned.
    pub fn start(&self) -> Result<(), PipelineError> {
        let worker = self
            .launch
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or(PipelineError::AlreadyStarted)?;

        self.shared.lock().started = true;
        let spawned = std::thread::Builder::new()
            .name("sfm-job".to_string())
            .spawn(move || worker.run());

        match spawned {
            Ok(handle) => {
                *self
                    .handle
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
                Ok(())
            }
            Err(e) => {
                let err = PipelineError::collaborator("Failed to spawn worker thread", e);
                {
                    let mut state = self.shared.lock();
                    state.stage = Stage::Error;
                    state.status = err.to_string();
                    state.result = Some(ReconstructionResult::failure(err.to_string()));
                }
                self.shared.mark_finished();
                Err(err)
            }
        }
    }

    /// Request cancellation. Takes effect at the next stage boundary; a no-op
    /// once the job is terminal.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        if !state.stage.is_terminal() && !state.cancel_requested {
            state.cancel_requested = true;
            info!(stage = %state.stage, "Cancellation requested");
        }
    }

    /// Block until the worker finishes or `timeout` elapses, returning the
    /// result recorded so far.
    pub fn wait(&self, timeout: Option<Duration>) -> Option<ReconstructionResult> {
        let (finished, result) = {
            let state = self.shared.wait_finished(timeout);
            (state.finished, state.result.clone())
        };
        if finished {
            self.reap();
        }
        result
    }

    fn reap(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            warn!("Worker thread panicked after finishing");
        }
    }

    /// Receive every event published from now on.
    ///
    /// Subscribe before [`Job::start`] to see the whole run.
    pub fn subscribe(&self) -> Receiver<JobEvent> {
        self.shared.events.subscribe()
    }

    pub fn stage(&self) -> Stage {
        self.shared.lock().stage
    }

    pub fn progress(&self) -> f64 {
        self.shared.lock().progress
    }

    pub fn status(&self) -> String {
        self.shared.lock().status.clone()
    }

    pub fn result(&self) -> Option<ReconstructionResult> {
        self.shared.lock().result.clone()
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().stage.is_running()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.shared.lock().snapshot()
    }
}

/// Run a stage plan on the calling thread and return its final result.
///
/// Without a concurrent `cancel()` the run always terminates in `Done` or
/// `Error`, so a result is always produced.
pub(crate) fn run_inline(
    config: ReconstructionConfig,
    backend: Arc<dyn Backend>,
    callbacks: Callbacks,
) -> ReconstructionResult {
    let shared = Arc::new(Shared::default());
    let worker = Worker {
        shared: Arc::clone(&shared),
        config: Arc::new(config),
        backend,
        callbacks,
        delivery: Mutex::new(()),
    };
    worker.run();
    let result = shared.lock().result.clone();
    result.unwrap_or_else(|| ReconstructionResult::failure("Cancelled"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

struct Worker {
    shared: Arc<Shared>,
    config: Arc<ReconstructionConfig>,
    backend: Arc<dyn Backend>,
    callbacks: Callbacks,
    /// Held from a state update until its callback and event are out, so
    /// progress reported from several threads is delivered in order.
    delivery: Mutex<()>,
}

impl Worker {
    fn deliver(&self) -> MutexGuard<'_, ()> {
        self.delivery
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn run(self) {
        let plan = self.config.stage_plan();
        let count = plan.len();
        let mut builder = ResultBuilder::new();
        info!(
            image_dir = %self.config.image_dir().display(),
            output_dir = %self.config.output_dir().display(),
            stages = count,
            "Job started"
        );

        for (index, stage) in plan.into_iter().enumerate() {
            let window = (boundary(index, count), boundary(index + 1, count));
            if !self.enter(stage, window.0) {
                return;
            }

            let started = Instant::now();
            match self.run_stage(stage, window, &mut builder) {
                Ok(message) => {
                    info!(
                        stage = %stage,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Stage complete"
                    );
                    self.publish(stage, window.1, message);
                }
                Err(err) => {
                    warn!(
                        stage = %stage,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        error = %err,
                        "Stage failed"
                    );
                    self.fail(err);
                    return;
                }
            }
        }

        self.complete(builder.finish());
    }

    /// Check for cancellation and publish `stage` as entered, atomically.
    /// Returns false when the run was cancelled instead.
    fn enter(&self, stage: Stage, percent: f64) -> bool {
        let _delivery = self.deliver();
        let (cancelled, percent, message) = {
            let mut state = self.shared.lock();
            if state.cancel_requested {
                state.stage = Stage::Cancelled;
                state.status = Stage::Cancelled.entering_message().to_string();
                (true, state.progress, state.status.clone())
            } else {
                state.stage = stage;
                state.status = stage.entering_message().to_string();
                (false, state.advance(percent), state.status.clone())
            }
        };

        if cancelled {
            info!(before = %stage, percent, "Job cancelled");
            self.notify_progress(Stage::Cancelled, percent, &message);
            self.shared.events.publish(JobEvent::Cancelled { percent });
            self.shared.mark_finished();
            return false;
        }

        self.notify_progress(stage, percent, &message);
        self.shared.events.publish(JobEvent::Progress {
            stage,
            percent,
            message,
        });
        true
    }

    /// Publish progress and status within the current stage.
    fn publish(&self, stage: Stage, percent: f64, message: String) {
        let _delivery = self.deliver();
        let percent = {
            let mut state = self.shared.lock();
            if state.stage != stage {
                return;
            }
            state.status = message.clone();
            state.advance(percent)
        };
        self.notify_progress(stage, percent, &message);
        self.shared.events.publish(JobEvent::Progress {
            stage,
            percent,
            message,
        });
    }

    /// Map `(current, total)` reported by a backend into the stage's window.
    fn sub_progress(
        &self,
        stage: Stage,
        window: (f64, f64),
        current: u64,
        total: u64,
        message: &str,
    ) {
        if total == 0 {
            return;
        }
        let fraction = (current as f64 / total as f64).clamp(0.0, 1.0);
        let percent = window.0 + (window.1 - window.0) * fraction;
        self.publish(stage, percent, message.to_string());
    }

    fn run_stage(
        &self,
        stage: Stage,
        window: (f64, f64),
        builder: &mut ResultBuilder,
    ) -> Result<String, PipelineError> {
        let sink = |current: u64, total: u64, message: &str| {
            self.sub_progress(stage, window, current, total, message)
        };
        let backend = self.backend.as_ref();
        let config = self.config.as_ref();

        let outcome = catch_unwind(AssertUnwindSafe(|| -> Result<String, PipelineError> {
            match stage {
                Stage::Extracting => {
                    let images = backend.extract(config, &sink)?;
                    builder.images_extracted(images);
                    Ok(format!("Extracted features from {} images", images))
                }
                Stage::Matching => {
                    let matches = backend.match_features(config, &sink)?;
                    Ok(format!("Matching complete: {} matches", matches))
                }
                Stage::Reconstructing => {
                    let result = backend.reconstruct(config, &sink)?;
                    if !result.success {
                        return Err(reconstruction_failure(result));
                    }
                    let message = format!("Reconstructed {} images", result.num_images);
                    builder.model(result);
                    Ok(message)
                }
                Stage::Undistorting => {
                    backend.undistort(config, &sink)?;
                    builder.undistorted(config.undistorted_path());
                    Ok("Undistortion complete".to_string())
                }
                other => Err(PipelineError::Collaborator(format!(
                    "{} is not a working stage",
                    other
                ))),
            }
        }));

        outcome.unwrap_or_else(|payload| {
            Err(PipelineError::Collaborator(format!(
                "{} stage panicked: {}",
                stage,
                panic_message(payload.as_ref())
            )))
        })
    }

    fn fail(&self, err: PipelineError) {
        let _delivery = self.deliver();
        let message = err.to_string();
        let percent = {
            let mut state = self.shared.lock();
            state.stage = Stage::Error;
            state.status = message.clone();
            state.result = Some(ReconstructionResult::failure(message.clone()));
            state.progress
        };

        self.notify_progress(Stage::Error, percent, &message);
        if let Some(on_error) = &self.callbacks.on_error {
            self.guarded("on_error", || on_error(&err));
        }
        self.shared.events.publish(JobEvent::Failed {
            kind: err.kind(),
            message,
        });
        self.shared.mark_finished();
    }

    fn complete(&self, result: ReconstructionResult) {
        let _delivery = self.deliver();
        let message = Stage::Done.entering_message();
        let percent = {
            let mut state = self.shared.lock();
            state.stage = Stage::Done;
            state.status = message.to_string();
            state.result = Some(result.clone());
            state.advance(100.0)
        };
        info!(
            images = result.num_images,
            points = result.num_points,
            warnings = result.warnings.len(),
            "Job complete"
        );

        self.notify_progress(Stage::Done, percent, message);
        if let Some(on_complete) = &self.callbacks.on_complete {
            self.guarded("on_complete", || on_complete(&result));
        }
        self.shared.events.publish(JobEvent::Completed(result));
        self.shared.mark_finished();
    }

    fn notify_progress(&self, stage: Stage, percent: f64, message: &str) {
        if let Some(on_progress) = &self.callbacks.on_progress {
            self.guarded("on_progress", || on_progress(stage, percent, message));
        }
    }

    /// Invoke a consumer callback; a panic is logged and otherwise ignored.
    fn guarded(&self, name: &str, f: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
            warn!(
                callback = name,
                panic = %panic_message(payload.as_ref()),
                "Callback panicked"
            );
        } else {
            debug!(callback = name, "Callback returned");
        }
    }
}

/// Error for a reconstruction that returned without a usable model.
fn reconstruction_failure(result: ReconstructionResult) -> PipelineError {
    let no_model = PipelineError::NoValidReconstruction;
    match result.error {
        Some(message) if message != no_model.to_string() => PipelineError::Collaborator(message),
        _ => no_model,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruction_failure_maps_standard_message() {
        let err = reconstruction_failure(ReconstructionResult::failure(
            "No valid reconstructions found",
        ));
        assert_eq!(err, PipelineError::NoValidReconstruction);
    }

    #[test]
    fn test_reconstruction_failure_keeps_other_messages() {
        let err = reconstruction_failure(ReconstructionResult::failure("mapper gave up"));
        assert_eq!(err, PipelineError::Collaborator("mapper gave up".into()));
    }

    #[test]
    fn test_panic_message_variants() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }

    #[test]
    fn test_callbacks_debug_shows_presence() {
        let callbacks = Callbacks {
            on_error: Some(Box::new(|_| {})),
            ..Callbacks::default()
        };
        let debug = format!("{:?}", callbacks);
        assert!(debug.contains("on_error: true"));
        assert!(debug.contains("on_progress: false"));
    }
}
