//! In-memory job registry.
//!
//! This crate provides:
//! - [`JobStore`], the single source of truth for job records and their logs
//! - Atomic, validated record updates
//! - Retention eviction of finished jobs

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{JobStore, StateCounts};
