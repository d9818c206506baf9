//! The Task entity and its creation request.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, TaskId, TaskStatus};

/// How the fuzz target is produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Target is compiled from uploaded sources with instrumentation.
    #[default]
    #[serde(alias = "whitebox")]
    SourceBuild,
    /// Target is an uploaded, uninstrumented executable.
    #[serde(alias = "blackbox")]
    Prebuilt,
}

/// How the target consumes each generated input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Input is written to the target's stdin.
    #[default]
    Stdin,
    /// Input is written to a file whose path is passed as an argument.
    File,
    /// Input is passed on the command line.
    Args,
}

/// Telemetry snapshot persisted with every task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskStats {
    /// Executions performed by the main engine instance.
    pub exec_count: u64,
    /// Unique crashing inputs.
    pub unique_crashes: u64,
    /// Unique hanging inputs.
    pub unique_hangs: u64,
    /// Executions summed over every engine instance.
    pub total_execs: u64,
    /// Current throughput.
    pub execs_per_sec: f64,
    /// Interesting inputs in the corpus.
    pub corpus_count: u64,
    /// Edge coverage percentage, two decimals.
    pub coverage: f64,
    /// Distinct edges discovered.
    pub edges_found: u64,
}

impl TaskStats {
    /// Merge the supplied fields of a partial update.
    pub fn merge(&mut self, update: &StatsUpdate) {
        if let Some(v) = update.exec_count {
            self.exec_count = v;
        }
        if let Some(v) = update.unique_crashes {
            self.unique_crashes = v;
        }
        if let Some(v) = update.unique_hangs {
            self.unique_hangs = v;
        }
        if let Some(v) = update.total_execs {
            self.total_execs = v;
        }
        if let Some(v) = update.execs_per_sec {
            self.execs_per_sec = v;
        }
        if let Some(v) = update.corpus_count {
            self.corpus_count = v;
        }
        if let Some(v) = update.coverage {
            self.coverage = v;
        }
        if let Some(v) = update.edges_found {
            self.edges_found = v;
        }
    }
}

/// Partial telemetry update; `None` fields are left untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsUpdate {
    pub exec_count: Option<u64>,
    pub unique_crashes: Option<u64>,
    pub unique_hangs: Option<u64>,
    pub total_execs: Option<u64>,
    pub execs_per_sec: Option<f64>,
    pub corpus_count: Option<u64>,
    pub coverage: Option<f64>,
    pub edges_found: Option<u64>,
}

/// A fully prepared request to create a task.
///
/// Upload, build and validation happen before this reaches the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: TaskKind,
    #[serde(default)]
    pub input_mode: InputMode,
    /// Build arguments (source builds only).
    #[serde(default)]
    pub build_args: Option<String>,
    /// Extra engine arguments, whitespace separated.
    #[serde(default)]
    pub engine_args: String,
    /// Runtime library dependencies (prebuilt targets only).
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Uploaded source manifest.
    #[serde(default)]
    pub source_files: Vec<String>,
    /// Validated target executable.
    #[serde(default)]
    pub target_binary: Option<PathBuf>,
}

impl CreateTaskRequest {
    /// Create a request with minimal required fields.
    pub fn new(name: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            name: name.into(),
            kind,
            input_mode: InputMode::Stdin,
            build_args: None,
            engine_args: String::new(),
            dependencies: Vec::new(),
            source_files: Vec::new(),
            target_binary: None,
        }
    }

    /// Builder method to set the input mode.
    pub fn with_input_mode(mut self, mode: InputMode) -> Self {
        self.input_mode = mode;
        self
    }

    /// Builder method to set engine arguments.
    pub fn with_engine_args(mut self, args: impl Into<String>) -> Self {
        self.engine_args = args.into();
        self
    }

    /// Builder method to set build arguments.
    pub fn with_build_args(mut self, args: impl Into<String>) -> Self {
        self.build_args = Some(args.into());
        self
    }

    /// Builder method to add a dependency.
    pub fn with_dependency(mut self, dep: impl Into<String>) -> Self {
        self.dependencies.push(dep.into());
        self
    }

    /// Builder method to add a source file.
    pub fn with_source_file(mut self, file: impl Into<String>) -> Self {
        self.source_files.push(file.into());
        self
    }

    /// Builder method to set the target executable.
    pub fn with_target(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_binary = Some(path.into());
        self
    }

    /// Check the request is usable.
    pub fn validate(&self) -> Result<(), CoreError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(CoreError::InvalidInput("task name is empty".to_string()));
        }
        if name.chars().count() > 100 {
            return Err(CoreError::InvalidInput(
                "task name exceeds 100 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// A Task is one unit of fuzzing work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Human-readable name.
    pub name: String,

    /// How the target is produced.
    #[serde(rename = "type", default)]
    pub kind: TaskKind,

    /// Current task status.
    pub status: TaskStatus,

    #[serde(default)]
    pub input_mode: InputMode,

    #[serde(default)]
    pub build_args: Option<String>,

    #[serde(default)]
    pub engine_args: String,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub source_files: Vec<String>,

    /// Executable the engine drives.
    #[serde(default)]
    pub target_binary: Option<PathBuf>,

    /// Seed corpus directory. Fixed at creation.
    pub seeds_dir: PathBuf,

    /// Engine output root. Fixed at creation.
    pub output_dir: PathBuf,

    /// Last merged telemetry.
    #[serde(flatten)]
    pub stats: TaskStats,

    pub created_at: DateTime<Utc>,

    /// First entry into Running. Written once.
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,

    /// First entry into a terminal status. Written once.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    pub last_updated: DateTime<Utc>,

    /// Pid of the engine process, kept after it exits.
    #[serde(default)]
    pub pid: Option<u32>,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_instance_count() -> u32 {
    1
}

impl Task {
    /// Create a new task in the initial status.
    pub fn new(
        id: TaskId,
        request: CreateTaskRequest,
        seeds_dir: PathBuf,
        output_dir: PathBuf,
    ) -> Self {
        let now = Utc::now();
        let build_args = match request.kind {
            TaskKind::SourceBuild => request.build_args,
            TaskKind::Prebuilt => None,
        };
        let dependencies = match request.kind {
            TaskKind::SourceBuild => Vec::new(),
            TaskKind::Prebuilt => request.dependencies,
        };
        Self {
            id,
            name: request.name.trim().to_string(),
            kind: request.kind,
            status: TaskStatus::Pending,
            input_mode: request.input_mode,
            build_args,
            engine_args: request.engine_args,
            dependencies,
            source_files: request.source_files,
            target_binary: request.target_binary,
            seeds_dir,
            output_dir,
            stats: TaskStats::default(),
            created_at: now,
            started_at: None,
            completed_at: None,
            last_updated: now,
            pid: None,
            instance_count: 1,
            error_message: None,
        }
    }

    /// Move to `next` if the lifecycle graph allows it.
    ///
    /// `started_at` is set on the first entry into Running and
    /// `completed_at` on the first entry into a terminal status.
    pub fn apply_status(
        &mut self,
        next: TaskStatus,
        message: Option<String>,
    ) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        self.last_updated = now;
        if let Some(message) = message {
            self.error_message = Some(message);
        }
        if next == TaskStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Merge a partial telemetry update.
    pub fn merge_stats(&mut self, update: &StatsUpdate) {
        self.stats.merge(update);
        self.last_updated = Utc::now();
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new(
            TaskId::new(1),
            CreateTaskRequest::new("demo", TaskKind::Prebuilt).with_target("/bin/true"),
            PathBuf::from("/tmp/seeds"),
            PathBuf::from("/tmp/out"),
        )
    }

    fn walk(task: &mut Task, path: &[TaskStatus]) {
        for status in path {
            task.apply_status(*status, None).unwrap();
        }
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert_eq!(task.instance_count, 1);
    }

    #[test]
    fn test_started_at_survives_pause_resume() {
        let mut task = task();
        walk(&mut task, &[TaskStatus::Ready, TaskStatus::Running]);
        let started = task.started_at;
        assert!(started.is_some());

        walk(&mut task, &[TaskStatus::Paused, TaskStatus::Running]);
        assert_eq!(task.started_at, started);
    }

    #[test]
    fn test_completed_at_set_on_terminal_entry() {
        let mut task = task();
        walk(&mut task, &[TaskStatus::Ready, TaskStatus::Running]);
        assert!(task.completed_at.is_none());

        task.apply_status(TaskStatus::Failed, Some("boom".into())).unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(task.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_invalid_transition_leaves_task_unchanged() {
        let mut task = task();
        let before = task.clone();
        let err = task.apply_status(TaskStatus::Running, None).unwrap_err();
        assert!(matches!(err, CoreError::InvalidStateTransition { .. }));
        assert_eq!(task, before);
    }

    #[test]
    fn test_merge_only_supplied_fields() {
        let mut stats = TaskStats {
            exec_count: 10,
            unique_crashes: 2,
            ..Default::default()
        };
        stats.merge(&StatsUpdate {
            exec_count: Some(99),
            coverage: Some(12.5),
            ..Default::default()
        });
        assert_eq!(stats.exec_count, 99);
        assert_eq!(stats.unique_crashes, 2);
        assert_eq!(stats.coverage, 12.5);
    }

    #[test]
    fn test_kind_specific_fields_dropped() {
        let request = CreateTaskRequest::new("src", TaskKind::SourceBuild)
            .with_build_args("-O2")
            .with_dependency("libz.so");
        let task = Task::new(TaskId::new(3), request, "/s".into(), "/o".into());
        assert_eq!(task.build_args.as_deref(), Some("-O2"));
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        assert!(CreateTaskRequest::new("  ", TaskKind::Prebuilt).validate().is_err());
        assert!(CreateTaskRequest::new("ok", TaskKind::Prebuilt).validate().is_ok());
    }

    #[test]
    fn test_descriptor_round_trip_and_defaults() {
        let mut task = task();
        task.stats.exec_count = 5;
        let json = serde_json::to_string(&task).unwrap();
        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);

        let minimal = r#"{
            "id": 9, "name": "legacy", "type": "blackbox", "status": "uploading",
            "seeds_dir": "/s", "output_dir": "/o",
            "created_at": "2024-01-01T00:00:00Z", "last_updated": "2024-01-01T00:00:00Z"
        }"#;
        let legacy: Task = serde_json::from_str(minimal).unwrap();
        assert_eq!(legacy.kind, TaskKind::Prebuilt);
        assert_eq!(legacy.status, TaskStatus::Pending);
        assert_eq!(legacy.instance_count, 1);
        assert_eq!(legacy.stats, TaskStats::default());
    }
}
