//! Engine process supervision.
//!
//! The supervisor owns every engine child process. Control calls for one
//! task (start/stop/pause/resume) are serialized by a per-task control lock;
//! different tasks never contend. Each started task gets a monitor loop
//! (see [`crate::monitor`]) that is cancelled and joined before a stop
//! signals the process.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, PoisonError};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fuzzrun_core::{Task, TaskId, TaskStatus};

use crate::collector::StatsCollector;
use crate::config::Config;
use crate::engine::{provision_instances, EngineCommand};
use crate::monitor::{self, MonitorHandle};
use crate::store::TaskStore;

/// Lines of engine output kept for failure messages.
const OUTPUT_TAIL_LINES: usize = 20;

/// How long to wait for the output readers to drain after an exit.
const OUTPUT_DRAIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

/// Supervisor errors.
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("Task {id} is {status}, expected ready")]
    InvalidState { id: TaskId, status: TaskStatus },

    #[error("Instance count {requested} is outside 1..={max}")]
    InvalidInstanceCount { requested: u32, max: u32 },

    #[error("Failed to launch engine: {0}")]
    LaunchFailed(String),

    #[error("Failed to signal process {pid}: {source}")]
    Signal {
        pid: u32,
        #[source]
        source: io::Error,
    },
}

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Alive,
    Exited(ExitStatus),
}

/// Bounded tail of an engine's combined output.
#[derive(Debug, Clone, Default)]
struct OutputTail(Arc<std::sync::Mutex<VecDeque<String>>>);

impl OutputTail {
    fn push(&self, line: String) {
        let mut lines = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == OUTPUT_TAIL_LINES {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    fn snapshot(&self) -> String {
        let lines = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// A running engine process.
struct TrackedProcess {
    pid: u32,
    child: Child,
    output: OutputTail,
    readers: Vec<JoinHandle<()>>,
}

impl TrackedProcess {
    /// Wait briefly for the output readers to reach EOF.
    async fn drain_output(&mut self) -> String {
        for reader in self.readers.drain(..) {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await.is_err() {
                debug!(pid = self.pid, "Output reader still open after exit");
            }
        }
        self.output.snapshot()
    }
}

/// Supervises engine processes.
pub struct ProcessSupervisor {
    config: Config,
    store: Arc<TaskStore>,
    collector: Arc<StatsCollector>,
    processes: Mutex<HashMap<TaskId, TrackedProcess>>,
    monitors: Mutex<HashMap<TaskId, MonitorHandle>>,
    controls: std::sync::Mutex<HashMap<TaskId, Arc<Mutex<()>>>>,
}

impl ProcessSupervisor {
    pub fn new(config: Config, store: Arc<TaskStore>, collector: Arc<StatsCollector>) -> Self {
        Self {
            config,
            store,
            collector,
            processes: Mutex::new(HashMap::new()),
            monitors: Mutex::new(HashMap::new()),
            controls: std::sync::Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    pub(crate) fn collector(&self) -> &Arc<StatsCollector> {
        &self.collector
    }

    /// Launch the engine for a ready task and start its monitor.
    ///
    /// Returns the engine pid. A launch failure moves the task to failed.
    pub async fn start(
        self: &Arc<Self>,
        id: TaskId,
        instance_count: u32,
    ) -> Result<u32, SupervisorError> {
        let control = self.control(id);
        let _guard = control.lock().await;

        let task = self
            .store
            .get(id)
            .await
            .ok_or(SupervisorError::TaskNotFound(id))?;
        if task.status != TaskStatus::Ready {
            return Err(SupervisorError::InvalidState {
                id,
                status: task.status,
            });
        }
        if !(1..=self.config.max_instances).contains(&instance_count) {
            return Err(SupervisorError::InvalidInstanceCount {
                requested: instance_count,
                max: self.config.max_instances,
            });
        }

        let mut tracked = match self.launch(&task, instance_count).await {
            Ok(tracked) => tracked,
            Err(message) => {
                error!(task_id = %id, error = %message, "Engine launch failed");
                self.store
                    .transition(id, &[TaskStatus::Ready], TaskStatus::Failed, Some(message.clone()))
                    .await;
                return Err(SupervisorError::LaunchFailed(message));
            }
        };
        let pid = tracked.pid;

        self.store.set_process(id, pid, instance_count).await;
        if !self
            .store
            .transition(id, &[TaskStatus::Ready], TaskStatus::Running, None)
            .await
        {
            // Status moved underneath us; do not leave an orphan behind.
            warn!(task_id = %id, pid, "Task left ready during launch, killing engine");
            if let Err(e) = tracked.child.kill().await {
                warn!(task_id = %id, pid, error = %e, "Failed to kill engine");
            }
            let status = self
                .store
                .get(id)
                .await
                .map(|t| t.status)
                .unwrap_or_default();
            return Err(SupervisorError::InvalidState { id, status });
        }

        self.processes.lock().await.insert(id, tracked);
        let handle = monitor::spawn(id, Arc::clone(self), self.config.monitor_interval);
        let previous = self.monitors.lock().await.insert(id, handle);
        if let Some(previous) = previous {
            previous.cancel().await;
        }

        info!(task_id = %id, pid, instances = instance_count, "Engine started");
        Ok(pid)
    }

    /// Terminate the engine of a running or paused task.
    ///
    /// Returns false if the task is unknown or has no supervised process.
    pub async fn stop(&self, id: TaskId) -> bool {
        let control = self.control(id);
        let _guard = control.lock().await;

        let Some(task) = self.store.get(id).await else {
            return false;
        };
        if !task.status.has_process() {
            return false;
        }

        let monitor = self.monitors.lock().await.remove(&id);
        if let Some(monitor) = monitor {
            monitor.cancel().await;
        }

        let Some(mut tracked) = self.processes.lock().await.remove(&id) else {
            debug!(task_id = %id, "No supervised process to stop");
            return false;
        };

        self.terminate(id, &mut tracked, task.status == TaskStatus::Paused)
            .await;

        self.store
            .transition(
                id,
                &[TaskStatus::Running, TaskStatus::Paused],
                TaskStatus::Stopped,
                None,
            )
            .await
    }

    /// Suspend the engine of a running task.
    pub async fn pause(&self, id: TaskId) -> bool {
        #[cfg(unix)]
        {
            self.signal_transition(id, TaskStatus::Running, TaskStatus::Paused, libc::SIGSTOP)
                .await
        }
        #[cfg(not(unix))]
        {
            warn!(task_id = %id, "Pause is not supported on this platform");
            false
        }
    }

    /// Continue the engine of a paused task.
    pub async fn resume(&self, id: TaskId) -> bool {
        #[cfg(unix)]
        {
            self.signal_transition(id, TaskStatus::Paused, TaskStatus::Running, libc::SIGCONT)
                .await
        }
        #[cfg(not(unix))]
        {
            warn!(task_id = %id, "Resume is not supported on this platform");
            false
        }
    }

    /// Non-blocking liveness probe. `None` if the task has no tracked process.
    pub async fn is_alive(&self, id: TaskId) -> Option<ProcessState> {
        let mut processes = self.processes.lock().await;
        let tracked = processes.get_mut(&id)?;
        match tracked.child.try_wait() {
            Ok(None) => Some(ProcessState::Alive),
            Ok(Some(status)) => Some(ProcessState::Exited(status)),
            Err(e) => {
                warn!(task_id = %id, pid = tracked.pid, error = %e, "Liveness probe failed");
                Some(ProcessState::Alive)
            }
        }
    }

    /// Whether the task has a tracked process.
    pub async fn is_tracked(&self, id: TaskId) -> bool {
        self.processes.lock().await.contains_key(&id)
    }

    /// Stop every supervised task.
    pub async fn stop_all(&self) {
        let ids: Vec<TaskId> = self.processes.lock().await.keys().copied().collect();
        for id in ids {
            self.stop(id).await;
        }
    }

    /// Drop the control lock of a deleted task.
    pub fn forget(&self, id: TaskId) {
        self.controls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }

    /// Record an engine exit observed by the monitor or a control call.
    pub(crate) async fn finish(&self, id: TaskId, status: ExitStatus) {
        let tracked = self.processes.lock().await.remove(&id);
        self.monitors.lock().await.remove(&id);

        let tail = match tracked {
            Some(mut tracked) => tracked.drain_output().await,
            None => String::new(),
        };

        let (next, message) = if status.success() {
            (TaskStatus::Completed, None)
        } else {
            (TaskStatus::Failed, Some(describe_exit(status, &tail)))
        };

        if self
            .store
            .transition(id, &[TaskStatus::Running, TaskStatus::Paused], next, message)
            .await
        {
            info!(task_id = %id, status = %next, exit = %status, "Engine exited");
        } else {
            warn!(task_id = %id, exit = %status, "Engine exited but task was no longer running");
        }
    }

    async fn launch(&self, task: &Task, instance_count: u32) -> Result<TrackedProcess, String> {
        let target = task
            .target_binary
            .clone()
            .ok_or_else(|| "task has no target executable".to_string())?;
        if !tokio::fs::try_exists(&target).await.unwrap_or(false) {
            return Err(format!("target executable not found: {}", target.display()));
        }

        provision_instances(&task.output_dir, instance_count)
            .await
            .map_err(|e| format!("failed to create engine output directories: {e}"))?;

        let engine = EngineCommand::for_task(task, &target, &self.config);
        debug!(task_id = %task.id, program = %engine.program.display(), args = ?engine.args, "Spawning engine");

        let mut cmd = engine.into_command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.config.engine_path.display()))?;
        let pid = child
            .id()
            .ok_or_else(|| "engine exited before its pid was known".to_string())?;

        let output = OutputTail::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(task.id, stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(task.id, stderr, output.clone()));
        }

        Ok(TrackedProcess {
            pid,
            child,
            output,
            readers,
        })
    }

    async fn terminate(&self, id: TaskId, tracked: &mut TrackedProcess, paused: bool) {
        #[cfg(unix)]
        {
            if let Err(e) = send_signal(tracked.pid, libc::SIGTERM) {
                debug!(task_id = %id, error = %e, "Terminate signal not delivered");
            }
            // A stopped process only handles SIGTERM once continued.
            if paused {
                if let Err(e) = send_signal(tracked.pid, libc::SIGCONT) {
                    debug!(task_id = %id, error = %e, "Continue signal not delivered");
                }
            }

            match tokio::time::timeout(self.config.stop_grace, tracked.child.wait()).await {
                Ok(Ok(status)) => {
                    info!(task_id = %id, pid = tracked.pid, exit = %status, "Engine terminated");
                    return;
                }
                Ok(Err(e)) => warn!(task_id = %id, error = %e, "Failed to wait for engine"),
                Err(_) => warn!(task_id = %id, pid = tracked.pid, "Engine ignored terminate, killing"),
            }
        }
        #[cfg(not(unix))]
        let _ = paused;

        if let Err(e) = tracked.child.kill().await {
            warn!(task_id = %id, pid = tracked.pid, error = %e, "Failed to kill engine");
        }
    }

    #[cfg(unix)]
    async fn signal_transition(
        &self,
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
        signal: libc::c_int,
    ) -> bool {
        let control = self.control(id);
        let _guard = control.lock().await;

        match self.store.get(id).await {
            Some(task) if task.status == from => {}
            _ => return false,
        }

        let exited = {
            let mut processes = self.processes.lock().await;
            let Some(tracked) = processes.get_mut(&id) else {
                return false;
            };
            match tracked.child.try_wait() {
                Ok(Some(status)) => Some(status),
                Ok(None) => {
                    if let Err(e) = send_signal(tracked.pid, signal) {
                        warn!(task_id = %id, error = %e, "Signal not delivered");
                        return false;
                    }
                    None
                }
                Err(e) => {
                    warn!(task_id = %id, pid = tracked.pid, error = %e, "Liveness probe failed");
                    return false;
                }
            }
        };

        // The engine exited between monitor ticks; record it instead.
        if let Some(status) = exited {
            self.finish(id, status).await;
            return false;
        }
        self.store.transition(id, &[from], to, None).await
    }

    fn control(&self, id: TaskId) -> Arc<Mutex<()>> {
        let mut controls = self.controls.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(controls.entry(id).or_default())
    }
}

fn spawn_reader<R>(id: TaskId, stream: R, output: OutputTail) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let trimmed = line.trim_end();
                    if !trimmed.is_empty() {
                        debug!(task_id = %id, line = %trimmed, "Engine output");
                        output.push(trimmed.to_string());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(task_id = %id, error = %e, "Engine output closed");
                    break;
                }
            }
        }
    })
}

fn describe_exit(status: ExitStatus, tail: &str) -> String {
    let reason = match status.code() {
        Some(code) => format!("engine exited with code {code}"),
        None => exit_signal(status)
            .map(|signal| format!("engine killed by signal {signal}"))
            .unwrap_or_else(|| "engine exited abnormally".to_string()),
    };
    if tail.is_empty() {
        reason
    } else {
        format!("{reason}: {tail}")
    }
}

#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> Result<(), SupervisorError> {
    let raw = libc::pid_t::try_from(pid).map_err(|_| SupervisorError::Signal {
        pid,
        source: io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"),
    })?;
    // SAFETY: kill(2) takes plain integers and touches no memory we own.
    if unsafe { libc::kill(raw, signal) } != 0 {
        return Err(SupervisorError::Signal {
            pid,
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use fuzzrun_core::{CreateTaskRequest, TaskKind};
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: Arc<TaskStore>,
        supervisor: Arc<ProcessSupervisor>,
        target: PathBuf,
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    async fn harness(engine_body: &str) -> Harness {
        harness_with_interval(engine_body, Duration::from_millis(50)).await
    }

    async fn harness_with_interval(engine_body: &str, monitor_interval: Duration) -> Harness {
        let dir = TempDir::new().unwrap();
        let engine = write_script(dir.path(), "engine.sh", engine_body);
        let target = write_script(dir.path(), "target.sh", "exit 0");
        let config = Config::with_data_root(dir.path().join("data"))
            .with_engine_path(engine)
            .with_monitor_interval(monitor_interval)
            .with_stop_grace(Duration::from_secs(2));

        let store = Arc::new(TaskStore::open(&config).await.unwrap());
        let collector = Arc::new(StatsCollector::new(config.stats_cache_ttl));
        let supervisor = Arc::new(ProcessSupervisor::new(config, store.clone(), collector));
        Harness {
            _dir: dir,
            store,
            supervisor,
            target,
        }
    }

    async fn ready_task(h: &Harness) -> TaskId {
        let request = CreateTaskRequest::new("t", TaskKind::Prebuilt).with_target(&h.target);
        let id = h.store.create(request).await.unwrap().id;
        assert!(h.store.update_status(id, TaskStatus::Ready, None).await);
        id
    }

    async fn wait_for_status(store: &TaskStore, id: TaskId, status: TaskStatus) -> Task {
        for _ in 0..100 {
            let task = store.get(id).await.unwrap();
            if task.status == status {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("task {id} never reached {status}");
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let h = harness("exec sleep 30").await;
        let id = ready_task(&h).await;

        let pid = h.supervisor.start(id, 1).await.unwrap();
        let task = h.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.pid, Some(pid));
        assert!(task.started_at.is_some());
        assert!(task.output_dir.join("fuzzer0").join("queue").is_dir());
        assert_eq!(h.supervisor.is_alive(id).await, Some(ProcessState::Alive));

        assert!(h.supervisor.stop(id).await);
        let task = h.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Stopped);
        assert!(task.completed_at.is_some());
        assert!(!h.supervisor.is_tracked(id).await);
        assert!(h.supervisor.is_alive(id).await.is_none());

        assert!(!h.supervisor.stop(id).await);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let h = harness("exec sleep 30").await;
        let id = ready_task(&h).await;

        let pid = h.supervisor.start(id, 1).await.unwrap();
        let err = h.supervisor.start(id, 1).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidState { .. }));
        assert_eq!(h.store.get(id).await.unwrap().pid, Some(pid));

        h.supervisor.stop(id).await;
    }

    #[tokio::test]
    async fn test_start_requires_ready() {
        let h = harness("exec sleep 30").await;
        let request = CreateTaskRequest::new("t", TaskKind::Prebuilt).with_target(&h.target);
        let id = h.store.create(request).await.unwrap().id;

        let err = h.supervisor.start(id, 1).await.unwrap_err();
        assert!(matches!(
            err,
            SupervisorError::InvalidState { status: TaskStatus::Pending, .. }
        ));
        assert!(matches!(
            h.supervisor.start(TaskId::new(42), 1).await,
            Err(SupervisorError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_instance_count_bounds() {
        let h = harness("exec sleep 30").await;
        let id = ready_task(&h).await;

        for count in [0, 11] {
            let err = h.supervisor.start(id, count).await.unwrap_err();
            assert!(matches!(err, SupervisorError::InvalidInstanceCount { .. }));
        }
        assert_eq!(h.store.get(id).await.unwrap().status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn test_multiple_instances_provision_directories() {
        let h = harness("exec sleep 30").await;
        let id = ready_task(&h).await;

        h.supervisor.start(id, 3).await.unwrap();
        let task = h.store.get(id).await.unwrap();
        assert_eq!(task.instance_count, 3);
        for i in 0..3 {
            assert!(task.output_dir.join(format!("fuzzer{i}")).join("crashes").is_dir());
        }
        h.supervisor.stop(id).await;
    }

    #[tokio::test]
    async fn test_missing_target_fails_task() {
        let h = harness("exec sleep 30").await;
        let request =
            CreateTaskRequest::new("t", TaskKind::Prebuilt).with_target("/nonexistent/target");
        let id = h.store.create(request).await.unwrap().id;
        h.store.update_status(id, TaskStatus::Ready, None).await;

        let err = h.supervisor.start(id, 1).await.unwrap_err();
        assert!(matches!(err, SupervisorError::LaunchFailed(_)));
        let task = h.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error_message.unwrap().contains("not found"));
        assert!(!h.supervisor.is_tracked(id).await);
    }

    #[tokio::test]
    async fn test_clean_exit_completes_task() {
        let h = harness("exit 0").await;
        let id = ready_task(&h).await;

        let pid = h.supervisor.start(id, 1).await.unwrap();
        let task = wait_for_status(&h.store, id, TaskStatus::Completed).await;
        assert!(task.completed_at.is_some());
        assert_eq!(task.pid, Some(pid));
        assert!(task.error_message.is_none());
        assert!(!h.supervisor.is_tracked(id).await);
    }

    #[tokio::test]
    async fn test_error_exit_fails_task_with_output() {
        let h = harness("echo 'PROGRAM ABORT : boom' >&2\nexit 3").await;
        let id = ready_task(&h).await;

        h.supervisor.start(id, 1).await.unwrap();
        let task = wait_for_status(&h.store, id, TaskStatus::Failed).await;
        let message = task.error_message.unwrap();
        assert!(message.contains("code 3"), "{message}");
        assert!(message.contains("boom"), "{message}");
    }

    #[tokio::test]
    async fn test_pause_resume_keeps_started_at() {
        let h = harness("exec sleep 30").await;
        let id = ready_task(&h).await;
        h.supervisor.start(id, 1).await.unwrap();
        let started = h.store.get(id).await.unwrap().started_at;

        assert!(!h.supervisor.resume(id).await);
        assert!(h.supervisor.pause(id).await);
        assert_eq!(h.store.get(id).await.unwrap().status, TaskStatus::Paused);
        assert!(!h.supervisor.pause(id).await);

        assert!(h.supervisor.resume(id).await);
        let task = h.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Running);
        assert_eq!(task.started_at, started);

        h.supervisor.stop(id).await;
    }

    #[tokio::test]
    async fn test_pause_after_engine_exit_completes_task() {
        // Monitor interval far beyond the test so only pause can see the exit.
        let h = harness_with_interval("exit 0", Duration::from_secs(30)).await;
        let id = ready_task(&h).await;
        h.supervisor.start(id, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(!h.supervisor.pause(id).await);
        let task = h.store.get(id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.completed_at.is_some());
        assert!(!h.supervisor.is_tracked(id).await);
        assert!(!h.supervisor.stop(id).await);
    }

    #[tokio::test]
    async fn test_stop_paused_task() {
        let h = harness("exec sleep 30").await;
        let id = ready_task(&h).await;
        h.supervisor.start(id, 1).await.unwrap();
        assert!(h.supervisor.pause(id).await);

        assert!(h.supervisor.stop(id).await);
        assert_eq!(h.store.get(id).await.unwrap().status, TaskStatus::Stopped);
    }

    #[tokio::test]
    async fn test_stop_all() {
        let h = harness("exec sleep 30").await;
        let a = ready_task(&h).await;
        let b = ready_task(&h).await;
        h.supervisor.start(a, 1).await.unwrap();
        h.supervisor.start(b, 1).await.unwrap();

        h.supervisor.stop_all().await;
        for id in [a, b] {
            assert_eq!(h.store.get(id).await.unwrap().status, TaskStatus::Stopped);
        }
    }

    #[test]
    fn test_output_tail_is_bounded() {
        let tail = OutputTail::default();
        for i in 0..30 {
            tail.push(format!("line {i}"));
        }
        let text = tail.snapshot();
        assert_eq!(text.lines().count(), OUTPUT_TAIL_LINES);
        assert!(text.starts_with("line 10"));
        assert!(text.ends_with("line 29"));
    }
}
