//! Media analysis pipeline.
//!
//! Drives one job from `Processing` to a terminal state:
//!
//! 1. checkpoint `Inspect` (25), run the inspection tool
//! 2. checkpoint `DeepAnalyze` (50), run the full decode pass
//! 3. extract diagnostic lines, store the full log, complete at 100
//!
//! Any tool failure marks the job `Failed` at its last checkpoint. Nothing is
//! retried. The failure detail (exit code, stderr) goes to the log output only;
//! the job record just says `Failed`.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use vprobe_media::{extract_diagnostics, MediaError, MediaToolchain};
use vprobe_models::{JobId, JobUpdate, Stage};
use vprobe_store::JobStore;

use crate::error::WorkerResult;
use crate::logging::JobLogger;

/// How a pipeline run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// Recorded as `Failed`, but caused by a cancellation request
    Cancelled,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::Cancelled => "cancelled",
        }
    }
}

/// Runs the analysis stages for a job and persists every transition.
pub struct JobPipeline {
    store: Arc<JobStore>,
    toolchain: Arc<dyn MediaToolchain>,
}

impl JobPipeline {
    pub fn new(store: Arc<JobStore>, toolchain: Arc<dyn MediaToolchain>) -> Self {
        Self { store, toolchain }
    }

    /// Run every stage for `id` against the staged `input`.
    ///
    /// Returns `Err` only when the store rejects an update, which means the
    /// record was not created by this job's submission.
    pub async fn run(
        &self,
        id: &JobId,
        input: &Path,
        cancel_rx: watch::Receiver<bool>,
    ) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(id);
        logger.log_start(input);

        let progress = self.enter(id, Stage::Inspect, &logger)?;
        if *cancel_rx.borrow() {
            return self.fail(id, progress, Stage::Inspect, MediaError::Cancelled, &logger);
        }
        let inspection = match self.toolchain.inspect(input, cancel_rx.clone()).await {
            Ok(output) => output,
            Err(e) => return self.fail(id, progress, Stage::Inspect, e, &logger),
        };

        let progress = self.enter(id, Stage::DeepAnalyze, &logger)?;
        if *cancel_rx.borrow() {
            return self.fail(id, progress, Stage::DeepAnalyze, MediaError::Cancelled, &logger);
        }
        let decode_log = match self.toolchain.deep_analyze(input, cancel_rx).await {
            Ok(output) => output,
            Err(e) => return self.fail(id, progress, Stage::DeepAnalyze, e, &logger),
        };

        let diagnostics = extract_diagnostics(&decode_log);
        let (log_bytes, diagnostic_lines) = (decode_log.len(), diagnostics.lines().count());

        // The log goes in first so a Completed record always has one
        self.store.put_log(id, decode_log)?;
        self.store.update(id, JobUpdate::completed(inspection, diagnostics))?;

        logger.log_completion(log_bytes, diagnostic_lines);
        Ok(JobOutcome::Completed)
    }

    /// Fail a job that was cancelled before it left the admission queue.
    pub fn cancel_before_start(&self, id: &JobId) -> WorkerResult<JobOutcome> {
        let logger = JobLogger::new(id);
        self.fail(id, Stage::Intake.progress(), Stage::Intake, MediaError::Cancelled, &logger)
    }

    fn enter(&self, id: &JobId, stage: Stage, logger: &JobLogger) -> WorkerResult<u8> {
        let record = self.store.update(id, JobUpdate::checkpoint(stage))?;
        logger.log_stage(stage);
        Ok(record.progress)
    }

    fn fail(
        &self,
        id: &JobId,
        progress: u8,
        stage: Stage,
        error: MediaError,
        logger: &JobLogger,
    ) -> WorkerResult<JobOutcome> {
        self.store.update(id, JobUpdate::failed(progress))?;

        if error.is_cancelled() {
            logger.log_cancelled(stage);
            return Ok(JobOutcome::Cancelled);
        }

        logger.log_stage_failed(stage, &error);
        Ok(JobOutcome::Failed)
    }
}
