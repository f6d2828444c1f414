//! Per-job structured logging.
//!
//! Every event carries the job ID, so one job's lifecycle can be filtered
//! out of interleaved output.

use std::path::Path;

use tracing::{debug, error, info, warn, Span};
use vprobe_media::MediaError;
use vprobe_models::{JobId, Stage};

/// Logger bound to one job's analysis run.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.clone(),
        }
    }

    pub fn log_start(&self, input: &Path) {
        info!(job_id = %self.job_id, input = %input.display(), "Analysis started");
    }

    /// Log entry into a pipeline stage.
    pub fn log_stage(&self, stage: Stage) {
        info!(
            job_id = %self.job_id,
            stage = %stage,
            progress = stage.progress(),
            "Job progress: entered {}", stage
        );
    }

    pub fn log_cancelled(&self, stage: Stage) {
        warn!(job_id = %self.job_id, stage = %stage, "Job cancelled");
    }

    /// Log a tool failure. Stderr goes to debug, it can be long.
    pub fn log_stage_failed(&self, stage: Stage, error: &MediaError) {
        error!(job_id = %self.job_id, stage = %stage, "Stage failed: {}", error);

        if let MediaError::FfmpegFailed {
            stderr: Some(stderr),
            exit_code,
            ..
        }
        | MediaError::FfprobeFailed {
            stderr: Some(stderr),
            exit_code,
            ..
        } = error
        {
            debug!(job_id = %self.job_id, exit_code = ?exit_code, stderr = %stderr, "Tool failure detail");
        }
    }

    pub fn log_completion(&self, log_bytes: usize, diagnostic_lines: usize) {
        info!(
            job_id = %self.job_id,
            log_bytes,
            diagnostic_lines,
            "Analysis completed"
        );
    }

    /// Span wrapping the job's task.
    pub fn create_span(&self) -> Span {
        tracing::info_span!("job", job_id = %self.job_id, operation = "media_analysis")
    }
}
