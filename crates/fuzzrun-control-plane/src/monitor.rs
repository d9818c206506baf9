//! Per-task monitor loop.
//!
//! While a task runs, the loop merges fresh telemetry into the store and
//! polls engine liveness. It idles while the task is paused and ends when
//! the task is terminal, unknown, no longer supervised or cancelled.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fuzzrun_core::{StatsUpdate, TaskId, TaskStatus};

use crate::supervisor::{ProcessState, ProcessSupervisor};

/// Handle to a running monitor loop.
pub struct MonitorHandle {
    token: CancellationToken,
    join: JoinHandle<()>,
}

impl MonitorHandle {
    /// Cancel the loop and wait until it has exited.
    pub async fn cancel(self) {
        self.token.cancel();
        if let Err(e) = self.join.await {
            debug!(error = %e, "Monitor loop ended abnormally");
        }
    }
}

/// Spawn the monitor loop of a task.
pub fn spawn(id: TaskId, supervisor: Arc<ProcessSupervisor>, interval: Duration) -> MonitorHandle {
    let token = CancellationToken::new();
    let join = tokio::spawn(run(id, supervisor, interval, token.clone()));
    MonitorHandle { token, join }
}

async fn run(
    id: TaskId,
    supervisor: Arc<ProcessSupervisor>,
    interval: Duration,
    token: CancellationToken,
) {
    debug!(task_id = %id, "Monitor started");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                debug!(task_id = %id, "Monitor cancelled");
                return;
            }
            _ = tokio::time::sleep(interval) => {}
        }

        if tick(id, &supervisor).await.is_break() {
            break;
        }
    }
    info!(task_id = %id, "Monitor finished");
}

async fn tick(id: TaskId, supervisor: &ProcessSupervisor) -> ControlFlow<()> {
    let Some(task) = supervisor.store().get(id).await else {
        return ControlFlow::Break(());
    };
    match task.status {
        TaskStatus::Running => {}
        TaskStatus::Paused => return ControlFlow::Continue(()),
        _ => return ControlFlow::Break(()),
    }

    // Merge only what the engine reported; a partial file must not zero the rest.
    let sample = supervisor.collector().sample(&task).await;
    if sample.update != StatsUpdate::default() {
        supervisor.store().update_stats(id, &sample.update).await;
    }

    match supervisor.is_alive(id).await {
        None => ControlFlow::Break(()),
        Some(ProcessState::Alive) => ControlFlow::Continue(()),
        Some(ProcessState::Exited(status)) => {
            supervisor.finish(id, status).await;
            ControlFlow::Break(())
        }
    }
}
