//! Live updates pushed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DashboardStats, FuzzStats, TaskId, TaskStatus};

/// Latest status and telemetry of one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: TaskId,
    pub task_name: String,
    pub status: TaskStatus,
    pub stats: FuzzStats,
    pub timestamp: DateTime<Utc>,
}

/// Latest dashboard aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardUpdate {
    pub stats: DashboardStats,
    pub timestamp: DateTime<Utc>,
}

/// An update delivered to an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    TaskUpdate(TaskUpdate),
    DashboardUpdate(DashboardUpdate),
}

impl Notification {
    /// Event name used on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::TaskUpdate(_) => "task_update",
            Self::DashboardUpdate(_) => "dashboard_update",
        }
    }

    /// Whether this update reports a task in a terminal state.
    pub fn is_final(&self) -> bool {
        match self {
            Self::TaskUpdate(update) => update.status.is_terminal(),
            Self::DashboardUpdate(_) => false,
        }
    }
}
