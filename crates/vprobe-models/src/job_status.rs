//! Job status model and state machine.
//!
//! A job moves `Queued -> Processing -> Completed | Failed`. `Queued` only
//! appears when admission control is enabled; otherwise jobs are created
//! directly in `Processing`. `Completed` and `Failed` are terminal.
//!
//! Progress is a coarse checkpoint counter (see [`Stage`]), not a time estimate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::JobId;

/// Job processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting for a free pipeline slot
    Queued,
    /// Job is actively being processed
    #[default]
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether a record in this state may be moved to `next`.
    ///
    /// Repeated `Processing` updates are allowed; they carry checkpoint advances.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        match self {
            JobState::Queued => matches!(next, JobState::Processing | JobState::Failed),
            JobState::Processing => matches!(
                next,
                JobState::Processing | JobState::Completed | JobState::Failed
            ),
            JobState::Completed | JobState::Failed => false,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Pipeline stage boundaries and the progress checkpoint each one records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Job accepted, nothing run yet
    Intake,
    /// Cheap metadata inspection
    Inspect,
    /// Full decode pass collecting diagnostics
    DeepAnalyze,
    /// Results persisted
    Finalize,
}

impl Stage {
    /// Progress percentage recorded when this stage is entered.
    pub fn progress(&self) -> u8 {
        match self {
            Stage::Intake => 0,
            Stage::Inspect => 25,
            Stage::DeepAnalyze => 50,
            Stage::Finalize => 100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Intake => "intake",
            Stage::Inspect => "inspect",
            Stage::DeepAnalyze => "deep_analyze",
            Stage::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A rejected record mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Progress cannot go backwards: {current} -> {requested}")]
    ProgressRegression { current: u8, requested: u8 },
}

/// Replacement values for the mutable fields of a [`JobRecord`].
///
/// Only constructible through the named constructors, so every update is
/// internally consistent: `Completed` always carries progress 100 and
/// `Failed` never carries summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    state: JobState,
    progress: u8,
    analysis_summary: Option<String>,
    diagnostic_summary: Option<String>,
}

impl JobUpdate {
    /// Enter a pipeline stage.
    pub fn checkpoint(stage: Stage) -> Self {
        Self {
            state: JobState::Processing,
            progress: stage.progress(),
            analysis_summary: None,
            diagnostic_summary: None,
        }
    }

    /// Fail the job, freezing progress at the given checkpoint.
    pub fn failed(progress: u8) -> Self {
        Self {
            state: JobState::Failed,
            progress: progress.min(100),
            analysis_summary: None,
            diagnostic_summary: None,
        }
    }

    /// Complete the job with both stage results attached.
    pub fn completed(analysis_summary: impl Into<String>, diagnostic_summary: impl Into<String>) -> Self {
        Self {
            state: JobState::Completed,
            progress: Stage::Finalize.progress(),
            analysis_summary: Some(analysis_summary.into()),
            diagnostic_summary: Some(diagnostic_summary.into()),
        }
    }
}

/// Snapshot of one job's identity and progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job identifier
    pub id: JobId,
    /// Current job state
    pub state: JobState,
    /// Progress percentage (0-100)
    pub progress: u8,
    /// Inspection output, present once the job completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<String>,
    /// Filtered diagnostic lines, present once the job completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_summary: Option<String>,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// Create a new record in `Processing` at progress 0.
    pub fn new(id: JobId) -> Self {
        Self::with_state(id, JobState::Processing)
    }

    /// Create a new record waiting for admission.
    pub fn queued(id: JobId) -> Self {
        Self::with_state(id, JobState::Queued)
    }

    fn with_state(id: JobId, state: JobState) -> Self {
        let now = Utc::now();
        Self {
            id,
            state,
            progress: Stage::Intake.progress(),
            analysis_summary: None,
            diagnostic_summary: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply an update, replacing every mutable field at once.
    ///
    /// The record is left untouched when the update is rejected.
    pub fn apply(&mut self, update: JobUpdate) -> Result<(), TransitionError> {
        if !self.state.can_transition_to(update.state) {
            return Err(TransitionError::InvalidTransition {
                from: self.state,
                to: update.state,
            });
        }
        if update.progress < self.progress {
            return Err(TransitionError::ProgressRegression {
                current: self.progress,
                requested: update.progress,
            });
        }

        self.state = update.state;
        self.progress = update.progress;
        self.analysis_summary = update.analysis_summary;
        self.diagnostic_summary = update.diagnostic_summary;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the fields agree with each other.
    ///
    /// Used by pollers and tests to assert that no half-applied update is visible.
    pub fn is_consistent(&self) -> bool {
        let summaries_present = self.analysis_summary.is_some() && self.diagnostic_summary.is_some();
        let summaries_absent = self.analysis_summary.is_none() && self.diagnostic_summary.is_none();

        match self.state {
            JobState::Queued => self.progress == 0 && summaries_absent,
            JobState::Processing => self.progress < 100 && summaries_absent,
            JobState::Completed => self.progress == 100 && summaries_present,
            JobState::Failed => self.progress < 100 && summaries_absent,
        }
    }
}
