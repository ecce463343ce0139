//! Common error type and alias.
//!
//! Every flow returns `AppResult`; handlers rely on the `IntoResponse` impl
//! so each route answers failures with the same `{"detail": ...}` body.
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid post_type: {0}")]
    InvalidPostType(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("ComfyUI unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Error queuing prompt: {0}")]
    SubmitFailed(String),

    #[error("Error tracking progress: {0}")]
    TrackingFailed(String),

    #[error("Error fetching image: {0}")]
    FetchFailed(String),

    #[error("Error uploading image: {0}")]
    UploadFailed(String),

    #[error("Unexpected result manifest: {0}")]
    MalformedManifest(String),

    #[error("{0}")]
    NoDataFound(String),

    #[error("Error fetching news: {0}")]
    News(String),

    #[error("Workflow error: {0}")]
    Workflow(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidPostType(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::BackendUnavailable(_)
            | AppError::SubmitFailed(_)
            | AppError::TrackingFailed(_)
            | AppError::FetchFailed(_)
            | AppError::UploadFailed(_)
            | AppError::MalformedManifest(_)
            | AppError::NoDataFound(_)
            | AppError::News(_)
            | AppError::Workflow(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(%status, "{}", self);
        } else {
            tracing::warn!(%status, "{}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

// Extractor rejections answer with the same `{"detail"}` body as flow errors.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::InvalidInput(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_errors_map_to_bad_request() {
        assert_eq!(AppError::InvalidPostType("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::InvalidInput("x".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn remote_errors_map_to_server_error() {
        for err in [
            AppError::SubmitFailed("x".into()),
            AppError::TrackingFailed("x".into()),
            AppError::FetchFailed("x".into()),
            AppError::UploadFailed("x".into()),
            AppError::MalformedManifest("x".into()),
            AppError::NoDataFound("x".into()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        }
    }

    #[test]
    fn submit_error_carries_upstream_message() {
        let err = AppError::SubmitFailed("Status: 400, Body: bad graph".into());
        assert_eq!(err.to_string(), "Error queuing prompt: Status: 400, Body: bad graph");
    }
}
