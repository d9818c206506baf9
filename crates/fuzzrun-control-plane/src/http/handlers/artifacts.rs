//! Crash and corpus artifact handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use fuzzrun_core::TaskId;

use crate::collector::ArtifactError;
use crate::http::responses::error;
use crate::service::FuzzService;

/// List crash files of every task, newest first.
pub async fn list_all_crashes(State(service): State<Arc<FuzzService>>) -> impl IntoResponse {
    Json(service.list_all_crash_files().await)
}

/// List crash files, newest first.
pub async fn list_crashes(
    State(service): State<Arc<FuzzService>>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    Json(service.list_crash_files(TaskId::new(id)).await)
}

/// List corpus files, newest first.
pub async fn list_corpus(
    State(service): State<Arc<FuzzService>>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    Json(service.list_corpus_files(TaskId::new(id)).await)
}

/// Download one crash file.
pub async fn download_crash(
    State(service): State<Arc<FuzzService>>,
    Path((id, filename)): Path<(u64, String)>,
) -> Response {
    match service.read_crash_file(TaskId::new(id), &filename).await {
        Ok(bytes) => (
            [
                (
                    header::CONTENT_TYPE,
                    "application/octet-stream".to_string(),
                ),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", filename.replace('"', "")),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e @ (ArtifactError::TaskNotFound(_) | ArtifactError::NotFound(_))) => {
            error(StatusCode::NOT_FOUND, e.to_string())
        }
        Err(e @ ArtifactError::InvalidName(_)) => error(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            warn!(task_id = id, error = %e, "Failed to read crash file");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
