//! Telemetry snapshots, artifact listings and the dashboard aggregate.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Task, TaskId, TaskStats, TaskStatus};

/// Point-in-time telemetry for one task, as returned by the collector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzStats {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(flatten)]
    pub stats: TaskStats,
    /// Size of the instrumented edge map; 0 when unknown.
    pub edges_total: u64,
    /// Wall-clock time since the task first started, `HH:MM:SS`.
    pub run_time: String,
    pub last_update: DateTime<Utc>,
}

impl FuzzStats {
    /// Snapshot built from the task's stored fields only.
    pub fn from_task(task: &Task, now: DateTime<Utc>) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            stats: task.stats,
            edges_total: 0,
            run_time: format_run_time(task.started_at, now),
            last_update: now,
        }
    }

    /// Value equality ignoring the wall clock (`run_time`, `last_update`).
    pub fn same_telemetry(&self, other: &FuzzStats) -> bool {
        self.task_id == other.task_id
            && self.status == other.status
            && self.stats == other.stats
            && self.edges_total == other.edges_total
    }
}

/// Edge coverage percentage rounded to two decimals; 0.0 when the map size is unknown.
pub fn coverage_percent(edges_found: u64, edges_total: u64) -> f64 {
    if edges_total == 0 {
        return 0.0;
    }
    round2(edges_found as f64 / edges_total as f64 * 100.0)
}

/// Format the elapsed time since `started_at` as `HH:MM:SS`.
pub fn format_run_time(started_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(started) = started_at else {
        return "00:00:00".to_string();
    };
    let total = (now - started).num_seconds().max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Which engine output directory an artifact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    /// Crashing inputs (`crashes/`).
    Crash,
    /// Interesting inputs (`queue/`).
    Corpus,
}

impl ArtifactKind {
    /// Directory name inside an engine instance's output directory.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Crash => "crashes",
            Self::Corpus => "queue",
        }
    }
}

/// A crash or corpus file found in an engine output directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub filename: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// Task counts, one bucket per defined status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub building: u64,
    pub ready: u64,
    pub running: u64,
    pub paused: u64,
    pub completed: u64,
    pub failed: u64,
    pub stopped: u64,
}

impl StatusCounts {
    /// Count one task with the given status.
    pub fn record(&mut self, status: TaskStatus) {
        *self.bucket_mut(status) += 1;
    }

    /// Count for one status.
    pub fn get(&self, status: TaskStatus) -> u64 {
        match status {
            TaskStatus::Pending => self.pending,
            TaskStatus::Building => self.building,
            TaskStatus::Ready => self.ready,
            TaskStatus::Running => self.running,
            TaskStatus::Paused => self.paused,
            TaskStatus::Completed => self.completed,
            TaskStatus::Failed => self.failed,
            TaskStatus::Stopped => self.stopped,
        }
    }

    /// Sum over every bucket.
    pub fn total(&self) -> u64 {
        TaskStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }

    fn bucket_mut(&mut self, status: TaskStatus) -> &mut u64 {
        match status {
            TaskStatus::Pending => &mut self.pending,
            TaskStatus::Building => &mut self.building,
            TaskStatus::Ready => &mut self.ready,
            TaskStatus::Running => &mut self.running,
            TaskStatus::Paused => &mut self.paused,
            TaskStatus::Completed => &mut self.completed,
            TaskStatus::Failed => &mut self.failed,
            TaskStatus::Stopped => &mut self.stopped,
        }
    }
}

/// Aggregate over every task, shown on the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_tasks: u64,
    pub by_status: StatusCounts,
    pub total_crashes: u64,
    pub total_executions: u64,
    /// Mean coverage over tasks with coverage > 0.
    pub avg_coverage: f64,
}

impl DashboardStats {
    /// Fold the aggregate over a set of tasks.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut out = Self::default();
        let mut coverage_sum = 0.0;
        let mut covered = 0u64;

        for task in tasks {
            out.total_tasks += 1;
            out.by_status.record(task.status);
            out.total_crashes += task.stats.unique_crashes;
            out.total_executions += task.stats.exec_count;
            if task.stats.coverage > 0.0 {
                coverage_sum += task.stats.coverage;
                covered += 1;
            }
        }

        if covered > 0 {
            out.avg_coverage = round2(coverage_sum / covered as f64);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CreateTaskRequest, TaskKind};
    use chrono::Duration;

    fn task(id: u64, status: TaskStatus, coverage: f64) -> Task {
        let mut task = Task::new(
            TaskId::new(id),
            CreateTaskRequest::new(format!("t{id}"), TaskKind::Prebuilt),
            "/s".into(),
            "/o".into(),
        );
        task.status = status;
        task.stats.coverage = coverage;
        task.stats.unique_crashes = id;
        task.stats.exec_count = id * 100;
        task
    }

    #[test]
    fn test_coverage_percent() {
        assert_eq!(coverage_percent(50, 200), 25.0);
        assert_eq!(coverage_percent(1, 3), 33.33);
        assert_eq!(coverage_percent(2, 3), 66.67);
        assert_eq!(coverage_percent(10, 0), 0.0);
        assert_eq!(coverage_percent(0, 0), 0.0);
        assert_eq!(coverage_percent(7, 7), 100.0);
    }

    #[test]
    fn test_format_run_time() {
        let now = Utc::now();
        assert_eq!(format_run_time(None, now), "00:00:00");
        let started = now - Duration::seconds(3 * 3600 + 25 * 60 + 7);
        assert_eq!(format_run_time(Some(started), now), "03:25:07");
        assert_eq!(format_run_time(Some(now + Duration::seconds(5)), now), "00:00:00");
    }

    #[test]
    fn test_dashboard_counts_every_status() {
        let tasks: Vec<Task> = TaskStatus::ALL
            .iter()
            .enumerate()
            .map(|(i, s)| task(i as u64 + 1, *s, 0.0))
            .collect();
        let dash = DashboardStats::from_tasks(&tasks);

        assert_eq!(dash.total_tasks, 8);
        assert_eq!(dash.by_status.total(), dash.total_tasks);
        for status in TaskStatus::ALL {
            assert_eq!(dash.by_status.get(status), 1);
        }
        assert_eq!(dash.total_crashes, (1..=8).sum::<u64>());
        assert_eq!(dash.total_executions, (1..=8).map(|i| i * 100).sum::<u64>());
    }

    #[test]
    fn test_dashboard_average_ignores_zero_coverage() {
        let tasks = vec![
            task(1, TaskStatus::Running, 10.0),
            task(2, TaskStatus::Running, 0.0),
            task(3, TaskStatus::Completed, 30.0),
        ];
        let dash = DashboardStats::from_tasks(&tasks);
        assert_eq!(dash.avg_coverage, 20.0);

        let none = DashboardStats::from_tasks(&[task(1, TaskStatus::Pending, 0.0)]);
        assert_eq!(none.avg_coverage, 0.0);
        assert_eq!(DashboardStats::from_tasks(Vec::<Task>::new().iter()).total_tasks, 0);
    }

    #[test]
    fn test_same_telemetry_ignores_clock() {
        let t = task(1, TaskStatus::Running, 5.0);
        let a = FuzzStats::from_task(&t, Utc::now());
        let mut b = a.clone();
        b.run_time = "01:00:00".into();
        b.last_update = a.last_update + Duration::seconds(60);
        assert!(a.same_telemetry(&b));

        b.stats.exec_count += 1;
        assert!(!a.same_telemetry(&b));
    }
}
