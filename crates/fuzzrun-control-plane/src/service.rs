//! Operation facade over the store, supervisor, collector and hub.
//!
//! Outer surfaces (HTTP, the binary) only ever talk to [`FuzzService`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use fuzzrun_core::{
    ArtifactFile, ArtifactKind, CreateTaskRequest, DashboardStats, FuzzStats, Task, TaskId,
    TaskKind, TaskStats, TaskStatus,
};

use crate::collector::{ArtifactError, StatsCollector};
use crate::config::Config;
use crate::hub::NotificationHub;
use crate::store::{StoreError, TaskStore};
use crate::supervisor::{ProcessSupervisor, SupervisorError};

/// One task in an exported report.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub task_id: TaskId,
    pub task_name: String,
    #[serde(rename = "task_type")]
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub stats: TaskStats,
}

/// Exported fuzzing report.
#[derive(Debug, Clone, Serialize)]
pub struct FuzzReport {
    pub generated_at: DateTime<Utc>,
    pub tasks: Vec<ReportEntry>,
    pub total_crashes: u64,
    pub total_executions: u64,
}

/// A crash file and the task that produced it.
#[derive(Debug, Clone, Serialize)]
pub struct TaskCrash {
    pub task_id: TaskId,
    pub task_name: String,
    #[serde(flatten)]
    pub file: ArtifactFile,
}

/// The fuzzing orchestration service.
pub struct FuzzService {
    store: Arc<TaskStore>,
    collector: Arc<StatsCollector>,
    supervisor: Arc<ProcessSupervisor>,
    hub: Arc<NotificationHub>,
}

impl FuzzService {
    /// Open the data roots, reload persisted tasks and wire the components.
    pub async fn open(config: Config) -> Result<Arc<Self>, StoreError> {
        let store = Arc::new(TaskStore::open(&config).await?);
        let collector = Arc::new(StatsCollector::new(config.stats_cache_ttl));
        let hub = Arc::new(NotificationHub::new(
            store.clone(),
            collector.clone(),
            config.task_notify_interval,
            config.dashboard_notify_interval,
        ));
        let supervisor = Arc::new(ProcessSupervisor::new(
            config,
            store.clone(),
            collector.clone(),
        ));

        Ok(Arc::new(Self {
            store,
            collector,
            supervisor,
            hub,
        }))
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.hub
    }

    pub async fn create(&self, request: CreateTaskRequest) -> Result<Task, StoreError> {
        self.store.create(request).await
    }

    pub async fn get(&self, id: TaskId) -> Option<Task> {
        self.store.get(id).await
    }

    pub async fn list(&self) -> Vec<Task> {
        self.store.list().await
    }

    /// Delete a task, stopping its engine first.
    ///
    /// Returns false if the task is unknown.
    pub async fn delete(&self, id: TaskId) -> bool {
        let Some(task) = self.store.get(id).await else {
            return false;
        };
        if task.status.has_process() && !self.supervisor.stop(id).await {
            warn!(task_id = %id, "Deleting task whose engine could not be stopped cleanly");
        }
        let removed = self.store.remove(id).await;
        self.collector.forget(id);
        self.supervisor.forget(id);
        removed
    }

    /// Move a task through its pre-running stages.
    ///
    /// Only Building, Ready and Failed are reachable this way, and only from
    /// a pre-running status.
    pub async fn advance_stage(
        &self,
        id: TaskId,
        status: TaskStatus,
        message: Option<String>,
    ) -> bool {
        if !matches!(
            status,
            TaskStatus::Building | TaskStatus::Ready | TaskStatus::Failed
        ) {
            return false;
        }
        self.store
            .transition(
                id,
                &[TaskStatus::Pending, TaskStatus::Building, TaskStatus::Ready],
                status,
                message,
            )
            .await
    }

    pub async fn start(&self, id: TaskId, instance_count: u32) -> Result<u32, SupervisorError> {
        self.supervisor.start(id, instance_count).await
    }

    pub async fn pause(&self, id: TaskId) -> bool {
        self.supervisor.pause(id).await
    }

    pub async fn resume(&self, id: TaskId) -> bool {
        self.supervisor.resume(id).await
    }

    pub async fn stop(&self, id: TaskId) -> bool {
        self.supervisor.stop(id).await
    }

    /// Current telemetry of a task.
    pub async fn get_stats(&self, id: TaskId) -> Option<FuzzStats> {
        let task = self.store.get(id).await?;
        Some(self.collector.read(&task).await)
    }

    pub async fn list_crash_files(&self, id: TaskId) -> Vec<ArtifactFile> {
        self.list_artifacts(id, ArtifactKind::Crash).await
    }

    /// Crash files of every task, newest first.
    pub async fn list_all_crash_files(&self) -> Vec<TaskCrash> {
        let mut crashes = Vec::new();
        for task in self.store.list().await {
            for file in self.collector.list_artifacts(&task, ArtifactKind::Crash).await {
                crashes.push(TaskCrash {
                    task_id: task.id,
                    task_name: task.name.clone(),
                    file,
                });
            }
        }
        crashes.sort_by(|a, b| {
            b.file
                .modified
                .cmp(&a.file.modified)
                .then_with(|| a.task_id.cmp(&b.task_id))
        });
        crashes
    }

    pub async fn list_corpus_files(&self, id: TaskId) -> Vec<ArtifactFile> {
        self.list_artifacts(id, ArtifactKind::Corpus).await
    }

    pub async fn read_crash_file(
        &self,
        id: TaskId,
        filename: &str,
    ) -> Result<Vec<u8>, ArtifactError> {
        let task = self
            .store
            .get(id)
            .await
            .ok_or(ArtifactError::TaskNotFound(id))?;
        self.collector
            .read_artifact(&task, ArtifactKind::Crash, filename)
            .await
    }

    pub async fn dashboard(&self) -> DashboardStats {
        DashboardStats::from_tasks(&self.store.list().await)
    }

    /// Report over every task, or only `filter` when given.
    pub async fn export_report(&self, filter: Option<TaskId>) -> FuzzReport {
        let tasks: Vec<ReportEntry> = self
            .store
            .list()
            .await
            .into_iter()
            .filter(|task| filter.map_or(true, |id| task.id == id))
            .map(|task| ReportEntry {
                task_id: task.id,
                task_name: task.name,
                kind: task.kind,
                status: task.status,
                created_at: task.created_at,
                started_at: task.started_at,
                completed_at: task.completed_at,
                stats: task.stats,
            })
            .collect();

        FuzzReport {
            generated_at: Utc::now(),
            total_crashes: tasks.iter().map(|t| t.stats.unique_crashes).sum(),
            total_executions: tasks.iter().map(|t| t.stats.exec_count).sum(),
            tasks,
        }
    }

    /// Stop every engine and disconnect every observer.
    pub async fn shutdown(&self) {
        info!("Shutting down fuzz service");
        self.hub.shutdown().await;
        self.supervisor.stop_all().await;
    }

    async fn list_artifacts(&self, id: TaskId, kind: ArtifactKind) -> Vec<ArtifactFile> {
        match self.store.get(id).await {
            Some(task) => self.collector.list_artifacts(&task, kind).await,
            None => Vec::new(),
        }
    }
}
