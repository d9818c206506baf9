//! HTTP request and response types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use fuzzrun_core::{TaskId, TaskKind, TaskStatus};

// ============================================================================
// Error types
// ============================================================================

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Build an error response with the given status code.
pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// ============================================================================
// Task types
// ============================================================================

/// Query string of the task list endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Only tasks with this status.
    pub status: Option<TaskStatus>,

    /// Only tasks of this type.
    #[serde(rename = "type")]
    pub kind: Option<TaskKind>,

    /// Only tasks whose name contains this text (case-insensitive).
    pub name: Option<String>,
}

/// Request body for the stage endpoint.
#[derive(Debug, Deserialize)]
pub struct StageRequest {
    pub status: TaskStatus,

    #[serde(default)]
    pub message: Option<String>,
}

/// Request body for the start endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Number of engine instances (defaults to 1).
    #[serde(default)]
    pub instances: Option<u32>,
}

/// Response body for the start endpoint.
#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub task_id: TaskId,
    pub pid: u32,
    pub instances: u32,
}

/// Response body for control actions.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
}

// ============================================================================
// Report and event types
// ============================================================================

/// Query string of the report endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub task: Option<u64>,
}

/// Query string of the event stream.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Follow this task.
    pub task: Option<u64>,

    /// Follow the dashboard aggregate.
    #[serde(default)]
    pub dashboard: bool,
}
