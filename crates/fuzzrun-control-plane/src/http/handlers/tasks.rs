//! Task management and control handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use tracing::{info, warn};

use fuzzrun_core::{CreateTaskRequest, Task, TaskId};

use crate::http::responses::{
    error, ActionResponse, ReportQuery, StageRequest, StartRequest, StartResponse, TaskListQuery,
};
use crate::service::FuzzService;
use crate::store::StoreError;
use crate::supervisor::SupervisorError;

/// List tasks, optionally filtered by status, type or name.
pub async fn list_tasks(
    State(service): State<Arc<FuzzService>>,
    Query(query): Query<TaskListQuery>,
) -> impl IntoResponse {
    let needle = query.name.as_deref().map(str::to_lowercase);
    let tasks: Vec<Task> = service
        .list()
        .await
        .into_iter()
        .filter(|t| query.status.map_or(true, |s| t.status == s))
        .filter(|t| query.kind.map_or(true, |k| t.kind == k))
        .filter(|t| {
            needle
                .as_deref()
                .map_or(true, |n| t.name.to_lowercase().contains(n))
        })
        .collect();
    Json(tasks)
}

/// Create a task from a prepared request.
pub async fn create_task(
    State(service): State<Arc<FuzzService>>,
    Json(req): Json<CreateTaskRequest>,
) -> Response {
    match service.create(req).await {
        Ok(task) => {
            info!(task_id = %task.id, "Task created via HTTP");
            (StatusCode::CREATED, Json(task)).into_response()
        }
        Err(StoreError::Invalid(e)) => error(StatusCode::BAD_REQUEST, e.to_string()),
        Err(e) => {
            warn!(error = %e, "Failed to create task");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Get one task.
pub async fn get_task(State(service): State<Arc<FuzzService>>, Path(id): Path<u64>) -> Response {
    match service.get(TaskId::new(id)).await {
        Some(task) => Json(task).into_response(),
        None => not_found(TaskId::new(id)),
    }
}

/// Delete a task, stopping its engine first.
pub async fn delete_task(
    State(service): State<Arc<FuzzService>>,
    Path(id): Path<u64>,
) -> Response {
    let id = TaskId::new(id);
    if service.delete(id).await {
        StatusCode::NO_CONTENT.into_response()
    } else {
        not_found(id)
    }
}

/// Move a task through its pre-running stages.
pub async fn advance_stage(
    State(service): State<Arc<FuzzService>>,
    Path(id): Path<u64>,
    Json(req): Json<StageRequest>,
) -> Response {
    let id = TaskId::new(id);
    let ok = service.advance_stage(id, req.status, req.message).await;
    action_response(&service, id, ok, "advance").await
}

/// Launch the engine.
pub async fn start_task(
    State(service): State<Arc<FuzzService>>,
    Path(id): Path<u64>,
    body: Option<Json<StartRequest>>,
) -> Response {
    let id = TaskId::new(id);
    let instances = body.and_then(|Json(b)| b.instances).unwrap_or(1);

    match service.start(id, instances).await {
        Ok(pid) => (
            StatusCode::OK,
            Json(StartResponse {
                task_id: id,
                pid,
                instances,
            }),
        )
            .into_response(),
        Err(e @ SupervisorError::TaskNotFound(_)) => error(StatusCode::NOT_FOUND, e.to_string()),
        Err(e @ SupervisorError::InvalidState { .. }) => error(StatusCode::CONFLICT, e.to_string()),
        Err(e @ SupervisorError::InvalidInstanceCount { .. }) => {
            error(StatusCode::BAD_REQUEST, e.to_string())
        }
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Suspend the engine.
pub async fn pause_task(State(service): State<Arc<FuzzService>>, Path(id): Path<u64>) -> Response {
    let id = TaskId::new(id);
    let ok = service.pause(id).await;
    action_response(&service, id, ok, "pause").await
}

/// Continue the engine.
pub async fn resume_task(
    State(service): State<Arc<FuzzService>>,
    Path(id): Path<u64>,
) -> Response {
    let id = TaskId::new(id);
    let ok = service.resume(id).await;
    action_response(&service, id, ok, "resume").await
}

/// Terminate the engine.
pub async fn stop_task(State(service): State<Arc<FuzzService>>, Path(id): Path<u64>) -> Response {
    let id = TaskId::new(id);
    let ok = service.stop(id).await;
    action_response(&service, id, ok, "stop").await
}

/// Current telemetry of a task.
pub async fn get_stats(State(service): State<Arc<FuzzService>>, Path(id): Path<u64>) -> Response {
    let id = TaskId::new(id);
    match service.get_stats(id).await {
        Some(stats) => Json(stats).into_response(),
        None => not_found(id),
    }
}

/// Dashboard aggregate.
pub async fn dashboard(State(service): State<Arc<FuzzService>>) -> impl IntoResponse {
    Json(service.dashboard().await)
}

/// Downloadable JSON report.
pub async fn export_report(
    State(service): State<Arc<FuzzService>>,
    Query(query): Query<ReportQuery>,
) -> impl IntoResponse {
    let report = service.export_report(query.task.map(TaskId::new)).await;
    (
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=fuzz_report.json",
        )],
        Json(report),
    )
}

async fn action_response(service: &FuzzService, id: TaskId, ok: bool, action: &str) -> Response {
    match service.get(id).await {
        None => not_found(id),
        Some(task) if ok => Json(ActionResponse {
            task_id: id,
            status: task.status,
        })
        .into_response(),
        Some(task) => error(
            StatusCode::CONFLICT,
            format!("Cannot {action} task {id} in status {}", task.status),
        ),
    }
}

fn not_found(id: TaskId) -> Response {
    error(StatusCode::NOT_FOUND, format!("Task not found: {id}"))
}
