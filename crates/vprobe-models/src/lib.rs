//! Shared data models for the VProbe backend.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers
//! - Job states, stage checkpoints and the transition rules between them
//! - Job records as seen by status pollers

pub mod job;
pub mod job_status;

// Re-export common types
pub use job::JobId;
pub use job_status::{JobRecord, JobState, JobUpdate, Stage, TransitionError};
