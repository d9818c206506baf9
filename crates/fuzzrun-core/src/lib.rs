//! FuzzRun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Process supervision
//! - Filesystem layout
//! - Runtime specifics
//!
//! All types here represent the core business domain of FuzzRun.

pub mod error;
pub mod event;
pub mod ids;
pub mod stats;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use error::CoreError;
pub use event::{DashboardUpdate, Notification, TaskUpdate};
pub use ids::{ObserverId, SubscriptionId, TaskId};
pub use stats::{
    coverage_percent, format_run_time, ArtifactFile, ArtifactKind, DashboardStats, FuzzStats,
    StatusCounts,
};
pub use status::TaskStatus;
pub use task::{CreateTaskRequest, InputMode, StatsUpdate, Task, TaskKind, TaskStats};
