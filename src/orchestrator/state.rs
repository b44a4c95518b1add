//! Shared job state.
//!
//! One mutex guards every field a reader can observe, so a stage change and
//! its progress value are always published together. A condition variable
//! wakes `wait()` callers once the worker has delivered its terminal
//! notifications.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::events::EventBus;
use crate::result::ReconstructionResult;
use crate::stage::Stage;

#[derive(Debug, Clone, Default)]
pub(crate) struct JobState {
    pub stage: Stage,
    pub progress: f64,
    pub status: String,
    pub cancel_requested: bool,
    pub result: Option<ReconstructionResult>,
    /// A worker has been launched for this job
    pub started: bool,
    /// The worker has delivered its terminal callbacks and events
    pub finished: bool,
}

impl JobState {
    /// Raise progress to `percent`, never lowering it. Returns the value now held.
    pub fn advance(&mut self, percent: f64) -> f64 {
        self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        self.progress
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            stage: self.stage,
            progress: self.progress,
            status: self.status.clone(),
            cancel_requested: self.cancel_requested,
            result: self.result.clone(),
        }
    }
}

/// Consistent view of every observable field, read under one lock.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub stage: Stage,
    pub progress: f64,
    pub status: String,
    pub cancel_requested: bool,
    pub result: Option<ReconstructionResult>,
}

impl JobSnapshot {
    pub fn is_running(&self) -> bool {
        self.stage.is_running()
    }
}

#[derive(Debug, Default)]
pub(crate) struct Shared {
    state: Mutex<JobState>,
    finished: Condvar,
    pub events: EventBus,
}

impl Shared {
    /// Acquire the state lock.
    ///
    /// Every write under this lock is a plain field assignment, so the state
    /// behind a poisoned lock is still coherent.
    pub fn lock(&self) -> MutexGuard<'_, JobState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mark_finished(&self) {
        self.lock().finished = true;
        self.finished.notify_all();
    }

    /// Block until the worker finishes or `timeout` elapses. Returns
    /// immediately when no worker was ever started.
    pub fn wait_finished(&self, timeout: Option<Duration>) -> MutexGuard<'_, JobState> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.lock();
        while state.started && !state.finished {
            state = match deadline {
                None => self
                    .finished
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    self.finished
                        .wait_timeout(state, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_advance_is_monotone_and_clamped() {
        let mut state = JobState::default();
        assert_eq!(state.advance(25.0), 25.0);
        assert_eq!(state.advance(10.0), 25.0);
        assert_eq!(state.advance(250.0), 100.0);
    }

    #[test]
    fn test_wait_returns_immediately_when_not_started() {
        let shared = Shared::default();
        let started = Instant::now();
        let state = shared.wait_finished(None);
        assert!(!state.finished);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_times_out_while_running() {
        let shared = Shared::default();
        shared.lock().started = true;
        let state = shared.wait_finished(Some(Duration::from_millis(20)));
        assert!(!state.finished);
    }

    #[test]
    fn test_wait_wakes_on_finish() {
        let shared = Arc::new(Shared::default());
        shared.lock().started = true;
        let worker = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                shared.mark_finished();
            })
        };
        let finished = shared.wait_finished(Some(Duration::from_secs(10))).finished;
        assert!(finished);
        worker.join().unwrap();
    }

    #[test]
    fn test_snapshot_copies_all_fields() {
        let mut state = JobState {
            stage: Stage::Reconstructing,
            status: "Reconstructing...".into(),
            cancel_requested: true,
            ..JobState::default()
        };
        state.advance(50.0);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.stage, Stage::Reconstructing);
        assert_eq!(snapshot.progress, 50.0);
        assert!(snapshot.cancel_requested);
        assert!(snapshot.is_running());
        assert!(snapshot.result.is_none());
    }
}
