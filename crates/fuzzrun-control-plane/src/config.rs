//! Control plane configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Control plane configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Task descriptors, one `task_<id>/task.json` per task.
    pub tasks_dir: PathBuf,

    /// Engine output roots, one `task_<id>` per task.
    pub outputs_dir: PathBuf,

    /// Seed corpora, one `task_<id>` per task.
    pub seeds_dir: PathBuf,

    /// Fuzzing engine executable.
    pub engine_path: PathBuf,

    /// Per-execution timeout passed to the engine unless the user sets one (ms).
    pub default_timeout_ms: u64,

    /// Use binary-only instrumentation for prebuilt targets.
    pub qemu_mode: bool,

    /// Upper bound on engine instances per task.
    pub max_instances: u32,

    /// Time allowed between terminate and kill when stopping.
    pub stop_grace: Duration,

    /// Monitor loop tick.
    pub monitor_interval: Duration,

    /// Poll interval of task subscriptions.
    pub task_notify_interval: Duration,

    /// Poll interval of dashboard subscriptions.
    pub dashboard_notify_interval: Duration,

    /// How long a telemetry snapshot may stand in for an unreadable stats file.
    pub stats_cache_ttl: Duration,

    /// HTTP server bind address.
    pub http_bind_addr: String,
}

impl Config {
    /// Configuration with every data directory beneath `root`.
    pub fn with_data_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            tasks_dir: root.join("tasks"),
            outputs_dir: root.join("outputs"),
            seeds_dir: root.join("seeds"),
            ..Self::default()
        }
    }

    /// Builder method to set the engine executable.
    pub fn with_engine_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.engine_path = path.into();
        self
    }

    /// Builder method to set the stop grace period.
    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// Builder method to set the monitor tick.
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Builder method to set both notification poll intervals.
    pub fn with_notify_intervals(mut self, task: Duration, dashboard: Duration) -> Self {
        self.task_notify_interval = task;
        self.dashboard_notify_interval = dashboard;
        self
    }

    /// Builder method to set the telemetry cache freshness window.
    pub fn with_stats_cache_ttl(mut self, ttl: Duration) -> Self {
        self.stats_cache_ttl = ttl;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tasks_dir: PathBuf::from("data/tasks"),
            outputs_dir: PathBuf::from("data/outputs"),
            seeds_dir: PathBuf::from("data/seeds"),
            engine_path: PathBuf::from("/usr/local/bin/afl-fuzz"),
            default_timeout_ms: 1000,
            qemu_mode: true,
            max_instances: 10,
            stop_grace: Duration::from_secs(5),
            monitor_interval: Duration::from_secs(2),
            task_notify_interval: Duration::from_secs(2),
            dashboard_notify_interval: Duration::from_secs(5),
            stats_cache_ttl: Duration::from_secs(30),
            http_bind_addr: "127.0.0.1:5000".to_string(),
        }
    }
}
