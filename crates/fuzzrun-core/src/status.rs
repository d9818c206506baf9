//! Task status state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a fuzzing task.
///
/// ```text
/// Pending -> Building -> Ready -> Running <-> Paused
///                                   |          |
///                                   v          v
///                      Completed / Failed / Stopped
/// ```
///
/// Failed is also reachable from every pre-running stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task created, inputs still being prepared.
    #[default]
    #[serde(alias = "uploading")]
    Pending,
    /// Target is being built or validated.
    #[serde(alias = "compiling")]
    Building,
    /// Target is ready to be fuzzed.
    Ready,
    /// Engine process is running.
    Running,
    /// Engine process is suspended.
    Paused,
    /// Engine exited cleanly.
    Completed,
    /// Build, launch or engine failure.
    Failed,
    /// Stopped on request.
    Stopped,
}

impl TaskStatus {
    /// Every defined status, in lifecycle order.
    pub const ALL: [TaskStatus; 8] = [
        Self::Pending,
        Self::Building,
        Self::Ready,
        Self::Running,
        Self::Paused,
        Self::Completed,
        Self::Failed,
        Self::Stopped,
    ];

    /// Returns true if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    /// Returns true before the engine has ever been started.
    pub fn is_pre_running(&self) -> bool {
        matches!(self, Self::Pending | Self::Building | Self::Ready)
    }

    /// Returns true while a supervised engine process is expected to exist.
    pub fn has_process(&self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    /// Returns true if `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Building | Ready | Failed) => true,
            (Building, Ready | Failed) => true,
            (Ready, Running | Failed) => true,
            (Running, Paused | Completed | Failed | Stopped) => true,
            (Paused, Running | Stopped) => true,
            _ => false,
        }
    }

    /// Lowercase name, as used on the wire and in metrics labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
