//! Newtype wrappers for identifiers to ensure type safety.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a Task.
///
/// Task ids are allocated monotonically by the store and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Create a new TaskId from its numeric value.
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the numeric value.
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The id that follows this one.
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Directory name used for this task under every data root (`task_<id>`).
    pub fn dir_name(self) -> String {
        format!("task_{}", self.0)
    }

    /// Parse a `task_<id>` directory name back into an id.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix("task_")?.parse().ok().map(Self)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for TaskId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// Unique identifier for a connected observer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(String);

impl ObserverId {
    /// Generate a new random ObserverId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one observer subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a new random SubscriptionId.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_dir_name_round_trip() {
        let id = TaskId::new(42);
        assert_eq!(id.dir_name(), "task_42");
        assert_eq!(TaskId::from_dir_name("task_42"), Some(id));
    }

    #[test]
    fn test_task_id_from_dir_name_rejects_garbage() {
        assert_eq!(TaskId::from_dir_name("task_"), None);
        assert_eq!(TaskId::from_dir_name("task_abc"), None);
        assert_eq!(TaskId::from_dir_name("job_3"), None);
    }

    #[test]
    fn test_task_id_ordering() {
        assert!(TaskId::new(2) > TaskId::new(1));
        assert_eq!(TaskId::new(1).next(), TaskId::new(2));
    }

    #[test]
    fn test_observer_id_generate() {
        let id1 = ObserverId::generate();
        let id2 = ObserverId::generate();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", TaskId::new(7)), "7");
        let sub = SubscriptionId::generate();
        assert_eq!(sub.to_string().len(), 36);
    }
}
