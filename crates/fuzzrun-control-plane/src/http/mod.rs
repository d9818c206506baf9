//! HTTP server for the control plane.
//!
//! Provides endpoints for:
//! - Task management (`/v1/tasks`)
//! - Engine control (`/v1/tasks/:id/{start,pause,resume,stop}`)
//! - Telemetry and artifacts (`/v1/tasks/:id/{stats,crashes,corpus}`, `/v1/crashes`)
//! - Dashboard and report (`/v1/dashboard`, `/v1/report`)
//! - Live updates over server-sent events (`/v1/events`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::FuzzService;

mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(service: Arc<FuzzService>) -> Router {
    // CORS layer for browser dashboards
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Task routes
        .route(
            "/v1/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route(
            "/v1/tasks/:id",
            get(handlers::get_task).delete(handlers::delete_task),
        )
        .route("/v1/tasks/:id/stage", post(handlers::advance_stage))
        .route("/v1/tasks/:id/start", post(handlers::start_task))
        .route("/v1/tasks/:id/pause", post(handlers::pause_task))
        .route("/v1/tasks/:id/resume", post(handlers::resume_task))
        .route("/v1/tasks/:id/stop", post(handlers::stop_task))
        // Telemetry routes
        .route("/v1/tasks/:id/stats", get(handlers::get_stats))
        .route("/v1/tasks/:id/crashes", get(handlers::list_crashes))
        .route(
            "/v1/tasks/:id/crashes/:filename",
            get(handlers::download_crash),
        )
        .route("/v1/tasks/:id/corpus", get(handlers::list_corpus))
        .route("/v1/crashes", get(handlers::list_all_crashes))
        .route("/v1/dashboard", get(handlers::dashboard))
        .route("/v1/report", get(handlers::export_report))
        .route("/v1/events", get(handlers::events))
        // Observability routes
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
