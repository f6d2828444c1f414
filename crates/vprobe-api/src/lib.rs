//! Axum HTTP API server.
//!
//! This crate provides:
//! - Upload staging and job submission
//! - Status, log and cancellation endpoints
//! - Health/readiness checks and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod staging;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
