//! Persisted record of one run, written to `{output_dir}/run.json`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::{PipelineOptions, ReconstructionConfig};
use crate::errors::ErrorKind;
use crate::orchestrator::JobEvent;
use crate::result::ReconstructionResult;
use crate::stage::Stage;

pub const RUN_RECORD_FILE: &str = "run.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub image_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temporary_output: bool,
    pub program: String,
    pub options: PipelineOptions,
}

impl RunConfig {
    pub fn from_config(config: &ReconstructionConfig, program: &str) -> Self {
        Self {
            image_dir: config.image_dir().to_path_buf(),
            output_dir: config.output_dir().to_path_buf(),
            temporary_output: config.is_temporary_output(),
            program: program.to_string(),
            options: config.options().clone(),
        }
    }
}

/// When a working stage was entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageAudit {
    pub stage: Stage,
    pub entered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub config: RunConfig,
    pub stages: Vec<StageAudit>,
    /// Last stage observed; terminal once the run has ended
    pub stage: Stage,
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReconstructionResult>,
}

impl RunRecord {
    pub fn new(config: RunConfig) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            ended_at: None,
            config,
            stages: Vec::new(),
            stage: Stage::Idle,
            progress: 0.0,
            error_kind: None,
            result: None,
        }
    }

    /// Fold one job event into the record.
    pub fn observe(&mut self, event: &JobEvent) {
        match event {
            JobEvent::Progress { stage, percent, .. } => {
                if self.stages.last().map(|s| s.stage) != Some(*stage) {
                    self.stages.push(StageAudit {
                        stage: *stage,
                        entered_at: Utc::now(),
                    });
                }
                self.stage = *stage;
                self.progress = *percent;
            }
            JobEvent::Completed(result) => {
                self.stage = Stage::Done;
                self.progress = 100.0;
                self.result = Some(result.clone());
                self.finish();
            }
            JobEvent::Failed { kind, message } => {
                self.stage = Stage::Error;
                self.error_kind = Some(*kind);
                self.result = Some(ReconstructionResult::failure(message.clone()));
                self.finish();
            }
            JobEvent::Cancelled { percent } => {
                self.stage = Stage::Cancelled;
                self.progress = *percent;
                self.finish();
            }
        }
    }

    pub fn finish(&mut self) {
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
    }

    /// Write the record into `dir`, returning the file path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(RUN_RECORD_FILE);
        let content = serde_json::to_string_pretty(self).context("Failed to serialize run record")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write run record: {}", path.display()))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse run record")
    }
}
