//! Health check handlers.

use std::path::Path;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
    pub jobs: JobCounts,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub ffprobe: CheckStatus,
    pub ffmpeg: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl CheckStatus {
    fn ok(path: &Path) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            path: Some(path.display().to_string()),
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            path: None,
        }
    }

    fn tool(found: Option<&Path>, name: &str) -> Self {
        match found {
            Some(path) => Self::ok(path),
            None => Self::error(format!("{} not found on PATH", name)),
        }
    }
}

#[derive(Serialize)]
pub struct JobCounts {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub active_tasks: usize,
}

/// Readiness check endpoint (readiness).
/// Checks that ffprobe and ffmpeg can be located.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let availability = state.tools.availability();
    let ffprobe = CheckStatus::tool(availability.ffprobe.as_deref(), "ffprobe");
    let ffmpeg = CheckStatus::tool(availability.ffmpeg.as_deref(), "ffmpeg");

    let counts = state.executor.store().state_counts();
    let all_ok = availability.all_present();

    let response = ReadinessResponse {
        status: if all_ok { "ready" } else { "degraded" }.to_string(),
        checks: ReadinessChecks { ffprobe, ffmpeg },
        jobs: JobCounts {
            total: counts.total(),
            queued: counts.queued,
            processing: counts.processing,
            completed: counts.completed,
            failed: counts.failed,
            active_tasks: state.executor.active_jobs(),
        },
    };

    if all_ok {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}
