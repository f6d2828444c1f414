//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use vprobe_worker::WorkerError;

use crate::config::is_production_environment;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Worker error: {0}")]
    Worker(WorkerError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Message for the response body. Internal details are hidden in production.
    fn detail(&self, production: bool) -> String {
        match self {
            ApiError::Internal(_) | ApiError::Worker(_) if production => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<WorkerError> for ApiError {
    fn from(e: WorkerError) -> Self {
        if e.is_not_found() {
            return ApiError::NotFound(e.to_string());
        }
        match e {
            WorkerError::ShuttingDown => ApiError::Unavailable("server is shutting down".to_string()),
            other => ApiError::Worker(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let production = std::env::var("ENVIRONMENT")
            .map(|env| is_production_environment(&env))
            .unwrap_or(false);

        let body = ErrorResponse {
            detail: self.detail(production),
            code: None,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vprobe_models::JobId;

    #[test]
    fn test_worker_not_found_maps_to_404() {
        let err: ApiError = WorkerError::not_found(&JobId::from("abc")).into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_internal_detail_hidden_only_in_production() {
        let err = ApiError::internal("disk on fire");
        assert_eq!(err.detail(true), "An internal error occurred");
        assert!(err.detail(false).contains("disk on fire"));

        let err = ApiError::bad_request("Missing id parameter");
        assert!(err.detail(true).contains("Missing id parameter"));
    }

    #[test]
    fn test_shutting_down_maps_to_503() {
        let err: ApiError = WorkerError::ShuttingDown.into();
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
