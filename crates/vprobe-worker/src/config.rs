//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum pipelines running at once; `None` admits every job immediately
    pub max_concurrent_jobs: Option<usize>,
    /// How long finished jobs are kept; `None` keeps them for the process lifetime
    pub retention: Option<Duration>,
    /// Interval between retention sweeps
    pub sweep_interval: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// ffprobe binary name or path
    pub ffprobe_path: String,
    /// ffmpeg binary name or path
    pub ffmpeg_path: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: None,
            retention: None,
            sweep_interval: Duration::from_secs(60),
            shutdown_timeout: Duration::from_secs(30),
            ffprobe_path: "ffprobe".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse::<usize>().ok())
                .filter(|n| *n > 0),
            retention: std::env::var("JOB_RETENTION_SECS")
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|n| *n > 0)
                .map(Duration::from_secs),
            sweep_interval: Duration::from_secs(
                std::env::var("JOB_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(60),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
        }
    }

    /// Limit concurrent pipelines.
    pub fn with_max_concurrent_jobs(mut self, limit: usize) -> Self {
        self.max_concurrent_jobs = Some(limit).filter(|n| *n > 0);
        self
    }

    /// Evict finished jobs older than `retention`.
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }
}
