//! Task registry with durable per-task descriptors.
//!
//! Every task lives in its own record lock, so mutations of one task are
//! serialized while different tasks never wait on each other. The registry
//! map itself is only write-locked to insert or remove a record.
//!
//! Layout on disk:
//! ```text
//! <tasks_dir>/id_counter
//! <tasks_dir>/task_<id>/task.json
//! <outputs_dir>/task_<id>/
//! <seeds_dir>/task_<id>/
//! ```

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use fuzzrun_core::{CoreError, CreateTaskRequest, StatsUpdate, Task, TaskId, TaskStatus};

use crate::config::Config;

const DESCRIPTOR_FILE: &str = "task.json";
const COUNTER_FILE: &str = "id_counter";

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage root '{path}' is not usable: {source}")]
    StorageRoot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to provision directory '{path}': {source}")]
    Provision {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// A task record. `None` once the task has been removed.
type Record = Arc<Mutex<Option<Task>>>;

/// Authoritative registry of tasks.
pub struct TaskStore {
    tasks_dir: PathBuf,
    outputs_dir: PathBuf,
    seeds_dir: PathBuf,
    tasks: RwLock<BTreeMap<TaskId, Record>>,
    /// Last allocated id.
    last_id: Mutex<TaskId>,
}

impl TaskStore {
    /// Open the store, creating the data roots and reloading every descriptor.
    ///
    /// Fails only if a data root cannot be created.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        for root in [&config.tasks_dir, &config.outputs_dir, &config.seeds_dir] {
            tokio::fs::create_dir_all(root)
                .await
                .map_err(|source| StoreError::StorageRoot {
                    path: root.clone(),
                    source,
                })?;
        }

        let store = Self {
            tasks_dir: config.tasks_dir.clone(),
            outputs_dir: config.outputs_dir.clone(),
            seeds_dir: config.seeds_dir.clone(),
            tasks: RwLock::new(BTreeMap::new()),
            last_id: Mutex::new(TaskId::new(0)),
        };
        store.reload().await;
        Ok(store)
    }

    /// Rebuild the registry from the descriptors on disk.
    async fn reload(&self) {
        let mut loaded = BTreeMap::new();
        let mut max_id = read_counter(&self.tasks_dir.join(COUNTER_FILE)).await;

        let mut entries = match tokio::fs::read_dir(&self.tasks_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.tasks_dir.display(), error = %e, "Failed to scan task directory");
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read task directory entry");
                    break;
                }
            };
            let name = entry.file_name();
            let Some(dir_id) = name.to_str().and_then(TaskId::from_dir_name) else {
                continue;
            };

            let path = entry.path().join(DESCRIPTOR_FILE);
            let mut task = match load_descriptor(&path).await {
                Ok(task) => task,
                Err(e) => {
                    warn!(task_id = %dir_id, path = %path.display(), error = %e, "Skipping unreadable task descriptor");
                    continue;
                }
            };

            if task.id != dir_id {
                warn!(task_id = %dir_id, descriptor_id = %task.id, path = %path.display(), "Skipping descriptor whose id does not match its directory");
                continue;
            }

            if task.status.has_process() {
                let message = "engine was not supervised after restart".to_string();
                if task.apply_status(TaskStatus::Stopped, Some(message)).is_ok() {
                    info!(task_id = %task.id, "Marked orphaned task as stopped");
                    self.persist(&task).await;
                }
            }

            max_id = max_id.max(task.id);
            loaded.insert(task.id, Arc::new(Mutex::new(Some(task))));
        }

        info!(tasks = loaded.len(), last_id = %max_id, "Task registry loaded");
        *self.last_id.lock().await = max_id;
        *self.tasks.write().await = loaded;
    }

    /// Create a task in the initial status with its directories provisioned.
    pub async fn create(&self, request: CreateTaskRequest) -> Result<Task, StoreError> {
        request.validate()?;
        let id = self.allocate_id().await;

        let task_dir = self.task_dir(id);
        let seeds_dir = self.seeds_dir.join(id.dir_name());
        let output_dir = self.outputs_dir.join(id.dir_name());
        for dir in [&task_dir, &seeds_dir, &output_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StoreError::Provision {
                    path: dir.clone(),
                    source,
                })?;
        }

        let task = Task::new(id, request, seeds_dir, output_dir);
        self.persist(&task).await;
        self.tasks
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(Some(task.clone()))));

        info!(task_id = %id, name = %task.name, kind = ?task.kind, "Task created");
        Ok(task)
    }

    /// Get a copy of a task.
    pub async fn get(&self, id: TaskId) -> Option<Task> {
        let record = self.record(id).await?;
        let task = record.lock().await.clone();
        task
    }

    /// All tasks in creation order.
    pub async fn list(&self) -> Vec<Task> {
        let records: Vec<Record> = self.tasks.read().await.values().cloned().collect();
        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            if let Some(task) = record.lock().await.clone() {
                tasks.push(task);
            }
        }
        tasks
    }

    /// Move a task to `status` if the lifecycle graph allows it.
    ///
    /// Returns false (and changes nothing) for unknown ids or invalid edges.
    pub async fn update_status(
        &self,
        id: TaskId,
        status: TaskStatus,
        message: Option<String>,
    ) -> bool {
        self.transition(id, &TaskStatus::ALL, status, message).await
    }

    /// Move a task to `to` only if its current status is one of `from`.
    pub async fn transition(
        &self,
        id: TaskId,
        from: &[TaskStatus],
        to: TaskStatus,
        message: Option<String>,
    ) -> bool {
        self.mutate(id, |task| {
            if !from.contains(&task.status) {
                debug!(task_id = %id, status = %task.status, to = %to, "Transition precondition not met");
                return false;
            }
            let previous = task.status;
            match task.apply_status(to, message) {
                Ok(()) => {
                    info!(task_id = %id, from = %previous, to = %to, "Task status changed");
                    true
                }
                Err(e) => {
                    debug!(task_id = %id, error = %e, "Rejected status change");
                    false
                }
            }
        })
        .await
    }

    /// Merge the supplied telemetry fields.
    pub async fn update_stats(&self, id: TaskId, update: &StatsUpdate) -> bool {
        self.mutate(id, |task| {
            task.merge_stats(update);
            true
        })
        .await
    }

    /// Record the supervised process of a task.
    pub async fn set_process(&self, id: TaskId, pid: u32, instance_count: u32) -> bool {
        self.mutate(id, |task| {
            task.pid = Some(pid);
            task.instance_count = instance_count;
            task.last_updated = chrono::Utc::now();
            true
        })
        .await
    }

    /// Remove a task and all of its directories.
    ///
    /// The caller is responsible for stopping the engine first.
    pub async fn remove(&self, id: TaskId) -> bool {
        let Some(record) = self.tasks.write().await.remove(&id) else {
            return false;
        };

        // Wait for in-flight mutations, then tombstone the record.
        let mut slot = record.lock().await;
        let task = slot.take();

        let mut dirs = vec![self.task_dir(id)];
        if let Some(task) = &task {
            dirs.push(task.seeds_dir.clone());
            dirs.push(task.output_dir.clone());
        }
        for dir in dirs {
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(task_id = %id, dir = %dir.display(), error = %e, "Failed to remove task directory"),
            }
        }

        info!(task_id = %id, "Task removed");
        true
    }

    /// Descriptor directory of a task.
    pub fn task_dir(&self, id: TaskId) -> PathBuf {
        self.tasks_dir.join(id.dir_name())
    }

    async fn record(&self, id: TaskId) -> Option<Record> {
        self.tasks.read().await.get(&id).cloned()
    }

    /// Apply `f` under the task's record lock and persist if it reports a change.
    async fn mutate<F>(&self, id: TaskId, f: F) -> bool
    where
        F: FnOnce(&mut Task) -> bool,
    {
        let Some(record) = self.record(id).await else {
            return false;
        };
        let mut slot = record.lock().await;
        let Some(task) = slot.as_mut() else {
            return false;
        };
        if !f(task) {
            return false;
        }
        // Persist while still holding the record so descriptor writes keep mutation order.
        self.persist(task).await;
        true
    }

    async fn allocate_id(&self) -> TaskId {
        let mut last = self.last_id.lock().await;
        *last = last.next();
        let path = self.tasks_dir.join(COUNTER_FILE);
        if let Err(e) = tokio::fs::write(&path, last.to_string()).await {
            warn!(path = %path.display(), error = %e, "Failed to persist id counter");
        }
        *last
    }

    /// Write the descriptor. Failures are logged; memory stays authoritative.
    async fn persist(&self, task: &Task) {
        let dir = self.task_dir(task.id);
        if let Err(e) = write_descriptor(&dir, task).await {
            warn!(task_id = %task.id, dir = %dir.display(), error = %e, "Failed to persist task descriptor");
        }
    }
}

async fn write_descriptor(dir: &Path, task: &Task) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(task).map_err(io::Error::other)?;
    let tmp = dir.join(format!("{DESCRIPTOR_FILE}.tmp"));
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, dir.join(DESCRIPTOR_FILE)).await
}

async fn load_descriptor(path: &Path) -> io::Result<Task> {
    let bytes = tokio::fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

async fn read_counter(path: &Path) -> TaskId {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text.trim().parse().unwrap_or(TaskId::new(0)),
        Err(_) => TaskId::new(0),
    }
}
