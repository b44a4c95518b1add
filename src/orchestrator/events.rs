//! Typed job events and their fan-out to subscribers.

use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

use serde::Serialize;

use crate::errors::ErrorKind;
use crate::result::ReconstructionResult;
use crate::stage::Stage;

/// Events emitted by a job's worker thread, in publication order.
///
/// A run emits any number of `Progress` events followed by exactly one of
/// `Completed`, `Failed` or `Cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A working stage was entered, advanced or finished.
    Progress {
        stage: Stage,
        percent: f64,
        message: String,
    },
    /// The run finished successfully.
    Completed(ReconstructionResult),
    /// A stage failed.
    Failed { kind: ErrorKind, message: String },
    /// Cancellation was observed at a stage boundary.
    Cancelled { percent: f64 },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobEvent::Progress { .. })
    }
}

/// Single-producer fan-out to any number of `mpsc` receivers.
///
/// Subscribers whose receiver has been dropped are removed on the next send.
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<Sender<JobEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> Receiver<JobEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: JobEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}
