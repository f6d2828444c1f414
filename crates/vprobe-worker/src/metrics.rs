//! Job lifecycle metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use std::time::Duration;

use metrics::{counter, gauge, histogram};

use crate::pipeline::JobOutcome;

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "vprobe_jobs_submitted_total";
    pub const JOBS_FINISHED_TOTAL: &str = "vprobe_jobs_finished_total";
    pub const JOBS_EVICTED_TOTAL: &str = "vprobe_jobs_evicted_total";
    pub const JOBS_IN_FLIGHT: &str = "vprobe_jobs_in_flight";
    pub const JOB_DURATION_SECONDS: &str = "vprobe_job_duration_seconds";
}

/// Record job submitted.
pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a job reaching a terminal state.
pub fn record_job_finished(outcome: JobOutcome, elapsed: Duration) {
    let labels = [("outcome", outcome.as_str().to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(elapsed.as_secs_f64());
}

/// Record jobs removed by the retention sweeper.
pub fn record_jobs_evicted(count: usize) {
    counter!(names::JOBS_EVICTED_TOTAL).increment(count as u64);
}

/// Keeps the in-flight gauge accurate for the lifetime of a job task.
pub(crate) struct InFlightGuard;

impl InFlightGuard {
    pub(crate) fn new() -> Self {
        gauge!(names::JOBS_IN_FLIGHT).increment(1.0);
        Self
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        gauge!(names::JOBS_IN_FLIGHT).decrement(1.0);
    }
}
