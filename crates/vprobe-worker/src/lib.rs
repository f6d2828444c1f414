//! Job lifecycle manager.
//!
//! This crate provides:
//! - The processing pipeline (inspect -> deep-analyze -> finalize)
//! - The submission/query façade with per-job cancellable tasks
//! - Optional admission control and retention sweeping
//! - Structured job logging and job metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retention;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, JobHandle};
pub use logging::JobLogger;
pub use pipeline::{JobOutcome, JobPipeline};
pub use retention::RetentionSweeper;
