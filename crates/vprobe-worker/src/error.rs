//! Worker error types.

use thiserror::Error;
use vprobe_models::JobId;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Executor is shutting down")]
    ShuttingDown,

    #[error("Store error: {0}")]
    Store(#[from] vprobe_store::StoreError),
}

impl WorkerError {
    pub fn not_found(id: &JobId) -> Self {
        Self::NotFound(id.clone())
    }

    /// Check if error is a lookup miss rather than a processing problem.
    pub fn is_not_found(&self) -> bool {
        match self {
            WorkerError::NotFound(_) => true,
            WorkerError::Store(e) => e.is_not_found(),
            _ => false,
        }
    }
}
