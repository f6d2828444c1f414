//! Application state.

use std::sync::Arc;

use vprobe_media::FfmpegToolchain;
use vprobe_worker::JobExecutor;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub executor: Arc<JobExecutor>,
    /// Used by the readiness check to locate the external tools
    pub tools: Arc<FfmpegToolchain>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig, executor: Arc<JobExecutor>, tools: Arc<FfmpegToolchain>) -> Self {
        Self {
            config,
            executor,
            tools,
        }
    }
}
