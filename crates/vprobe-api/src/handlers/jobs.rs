//! Job handlers: upload, status, log and cancellation.

use std::sync::Arc;
use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use vprobe_models::{JobId, JobRecord};

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::staging::{self, StagedUpload, StagingFile};
use crate::state::AppState;

/// Multipart field carrying the media file.
pub const UPLOAD_FIELD: &str = "videoFile";

/// `?id=` query used by the lookup endpoints.
#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub id: Option<String>,
}

impl JobQuery {
    fn job_id(self) -> ApiResult<JobId> {
        match self.id {
            Some(id) if !id.trim().is_empty() => Ok(JobId::from(id)),
            _ => Err(ApiError::bad_request("Missing id parameter")),
        }
    }
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub id: JobId,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub id: JobId,
    pub cancelled: bool,
}

/// POST /upload
///
/// Stages the `videoFile` field to disk and submits a job for it.
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let started = Instant::now();
    let mut staged: Option<StagedUpload> = None;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let mut file = StagingFile::create(&state.config.upload_dir)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to stage upload: {}", e)))?;
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            file.write_chunk(&chunk)
                .await
                .map_err(|e| ApiError::internal(format!("Failed to write upload: {}", e)))?;
        }
        staged = Some(
            file.persist()
                .await
                .map_err(|e| ApiError::internal(format!("Failed to save upload: {}", e)))?,
        );
        break;
    }

    let staged =
        staged.ok_or_else(|| ApiError::bad_request(format!("Missing required '{}' field", UPLOAD_FIELD)))?;

    let id = match state.executor.submit(staged.path.clone()) {
        Ok(id) => id,
        Err(e) => {
            staging::discard(&staged).await;
            return Err(e.into());
        }
    };

    metrics::record_upload(staged.bytes, started.elapsed().as_secs_f64());
    info!(job_id = %id, bytes = staged.bytes, "Upload staged");

    Ok(Json(UploadResponse { id }))
}

/// GET /status?id=
pub async fn status(State(state): State<AppState>, Query(query): Query<JobQuery>) -> ApiResult<Json<JobRecord>> {
    let id = query.job_id()?;
    Ok(Json(state.executor.query_status(&id)?))
}

/// GET /log?id=
///
/// Full decode log as plain text. Only completed jobs have one.
pub async fn log(State(state): State<AppState>, Query(query): Query<JobQuery>) -> ApiResult<impl IntoResponse> {
    let id = query.job_id()?;
    let log = state.executor.query_log(&id)?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from(Bytes::from_owner(SharedLog(log))),
    ))
}

/// Lets the response body borrow the stored log instead of copying it.
struct SharedLog(Arc<str>);

impl AsRef<[u8]> for SharedLog {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// POST /cancel?id=
pub async fn cancel(State(state): State<AppState>, Query(query): Query<JobQuery>) -> ApiResult<Json<CancelResponse>> {
    let id = query.job_id()?;
    let cancelled = state.executor.cancel(&id)?;
    Ok(Json(CancelResponse { id, cancelled }))
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::bad_request(e.body_text())
    }
}
