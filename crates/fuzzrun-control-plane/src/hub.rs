//! Live update fan-out to connected observers.
//!
//! Each observer owns a bounded channel and any number of subscriptions.
//! A subscription is a poll loop that pushes an update only when the
//! snapshot changed since the last one it sent. Every observer has a
//! cancellation token; subscription tokens are its children, so
//! disconnecting an observer cancels all of its loops at once.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fuzzrun_core::{
    DashboardStats, DashboardUpdate, FuzzStats, Notification, ObserverId, SubscriptionId, TaskId,
    TaskUpdate,
};

use crate::collector::StatsCollector;
use crate::store::TaskStore;

/// Updates buffered per observer before a slow reader applies backpressure.
const OBSERVER_BUFFER: usize = 64;

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Observer not found: {0}")]
    ObserverNotFound(ObserverId),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(SubscriptionId),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
}

struct Subscription {
    token: CancellationToken,
    join: JoinHandle<()>,
}

struct Observer {
    tx: mpsc::Sender<Notification>,
    token: CancellationToken,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

/// Fan-out of task and dashboard updates.
pub struct NotificationHub {
    store: Arc<TaskStore>,
    collector: Arc<StatsCollector>,
    task_interval: Duration,
    dashboard_interval: Duration,
    observers: Mutex<HashMap<ObserverId, Observer>>,
}

impl NotificationHub {
    pub fn new(
        store: Arc<TaskStore>,
        collector: Arc<StatsCollector>,
        task_interval: Duration,
        dashboard_interval: Duration,
    ) -> Self {
        Self {
            store,
            collector,
            task_interval,
            dashboard_interval,
            observers: Mutex::new(HashMap::new()),
        }
    }

    /// Register an observer and return its update stream.
    pub async fn connect(&self) -> (ObserverId, mpsc::Receiver<Notification>) {
        let id = ObserverId::generate();
        let (tx, rx) = mpsc::channel(OBSERVER_BUFFER);
        self.observers.lock().await.insert(
            id.clone(),
            Observer {
                tx,
                token: CancellationToken::new(),
                subscriptions: HashMap::new(),
            },
        );
        info!(observer = %id, "Observer connected");
        (id, rx)
    }

    /// Follow one task until it reaches a terminal status.
    pub async fn subscribe_task(
        &self,
        observer: &ObserverId,
        task_id: TaskId,
    ) -> Result<SubscriptionId, HubError> {
        if self.store.get(task_id).await.is_none() {
            return Err(HubError::TaskNotFound(task_id));
        }
        let store = Arc::clone(&self.store);
        let collector = Arc::clone(&self.collector);
        let interval = self.task_interval;
        self.subscribe(observer, move |tx, token| {
            task_loop(task_id, store, collector, interval, tx, token)
        })
        .await
    }

    /// Follow the dashboard aggregate.
    pub async fn subscribe_dashboard(
        &self,
        observer: &ObserverId,
    ) -> Result<SubscriptionId, HubError> {
        let store = Arc::clone(&self.store);
        let interval = self.dashboard_interval;
        self.subscribe(observer, move |tx, token| {
            dashboard_loop(store, interval, tx, token)
        })
        .await
    }

    /// Cancel one subscription. Its loop exits by the next poll boundary.
    pub async fn unsubscribe(
        &self,
        observer: &ObserverId,
        subscription: &SubscriptionId,
    ) -> Result<(), HubError> {
        let mut observers = self.observers.lock().await;
        let entry = observers
            .get_mut(observer)
            .ok_or_else(|| HubError::ObserverNotFound(observer.clone()))?;
        let sub = entry
            .subscriptions
            .remove(subscription)
            .ok_or_else(|| HubError::SubscriptionNotFound(subscription.clone()))?;
        sub.token.cancel();
        debug!(observer = %observer, subscription = %subscription, "Unsubscribed");
        Ok(())
    }

    /// Remove an observer and cancel all of its subscriptions.
    ///
    /// Returns once every subscription loop has exited.
    pub async fn disconnect(&self, observer: &ObserverId) -> bool {
        let Some(entry) = self.observers.lock().await.remove(observer) else {
            return false;
        };
        entry.token.cancel();
        for (id, sub) in entry.subscriptions {
            if let Err(e) = sub.join.await {
                debug!(observer = %observer, subscription = %id, error = %e, "Subscription loop ended abnormally");
            }
        }
        info!(observer = %observer, "Observer disconnected");
        true
    }

    /// Disconnect every observer.
    pub async fn shutdown(&self) {
        let ids: Vec<ObserverId> = self.observers.lock().await.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id).await;
        }
    }

    /// Number of connected observers.
    pub async fn observer_count(&self) -> usize {
        self.observers.lock().await.len()
    }

    /// Number of subscriptions whose loop is still running.
    pub async fn active_subscriptions(&self, observer: &ObserverId) -> usize {
        self.observers
            .lock()
            .await
            .get(observer)
            .map(|o| {
                o.subscriptions
                    .values()
                    .filter(|s| !s.join.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }

    async fn subscribe<F, Fut>(
        &self,
        observer: &ObserverId,
        make_loop: F,
    ) -> Result<SubscriptionId, HubError>
    where
        F: FnOnce(mpsc::Sender<Notification>, CancellationToken) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let mut observers = self.observers.lock().await;
        let entry = observers
            .get_mut(observer)
            .ok_or_else(|| HubError::ObserverNotFound(observer.clone()))?;

        // Finished loops (terminal tasks) are pruned lazily.
        entry.subscriptions.retain(|_, s| !s.join.is_finished());

        let id = SubscriptionId::generate();
        let token = entry.token.child_token();
        let join = tokio::spawn(make_loop(entry.tx.clone(), token.clone()));
        entry
            .subscriptions
            .insert(id.clone(), Subscription { token, join });
        debug!(observer = %observer, subscription = %id, "Subscribed");
        Ok(id)
    }
}

async fn task_loop(
    task_id: TaskId,
    store: Arc<TaskStore>,
    collector: Arc<StatsCollector>,
    interval: Duration,
    tx: mpsc::Sender<Notification>,
    token: CancellationToken,
) {
    let mut last: Option<FuzzStats> = None;
    loop {
        if token.is_cancelled() || tx.is_closed() {
            return;
        }
        let Some(task) = store.get(task_id).await else {
            debug!(task_id = %task_id, "Subscribed task disappeared");
            return;
        };

        let stats = collector.read(&task).await;
        let changed = last
            .as_ref()
            .map_or(true, |previous| !previous.same_telemetry(&stats));
        let terminal = task.is_terminal();

        if changed || terminal {
            let update = Notification::TaskUpdate(TaskUpdate {
                task_id,
                task_name: task.name.clone(),
                status: task.status,
                stats: stats.clone(),
                timestamp: Utc::now(),
            });
            if !deliver(&tx, &token, update).await {
                return;
            }
            last = Some(stats);
        }
        if terminal {
            debug!(task_id = %task_id, status = %task.status, "Task subscription finished");
            return;
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn dashboard_loop(
    store: Arc<TaskStore>,
    interval: Duration,
    tx: mpsc::Sender<Notification>,
    token: CancellationToken,
) {
    let mut last: Option<DashboardStats> = None;
    loop {
        if token.is_cancelled() || tx.is_closed() {
            return;
        }
        let tasks = store.list().await;
        let stats = DashboardStats::from_tasks(&tasks);
        if last != Some(stats) {
            let update = Notification::DashboardUpdate(DashboardUpdate {
                stats,
                timestamp: Utc::now(),
            });
            if !deliver(&tx, &token, update).await {
                return;
            }
            last = Some(stats);
        }

        tokio::select! {
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// Send one update; false if the observer is gone or the loop was cancelled.
async fn deliver(
    tx: &mpsc::Sender<Notification>,
    token: &CancellationToken,
    update: Notification,
) -> bool {
    tokio::select! {
        _ = token.cancelled() => false,
        sent = tx.send(update) => sent.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuzzrun_core::{CreateTaskRequest, TaskKind, TaskStatus};
    use tempfile::TempDir;

    use crate::config::Config;

    async fn setup(dir: &TempDir) -> (Arc<TaskStore>, NotificationHub) {
        let store = Arc::new(
            TaskStore::open(&Config::with_data_root(dir.path()))
                .await
                .unwrap(),
        );
        let collector = Arc::new(StatsCollector::new(Duration::from_secs(30)));
        let hub = NotificationHub::new(
            store.clone(),
            collector,
            Duration::from_millis(20),
            Duration::from_millis(20),
        );
        (store, hub)
    }

    async fn next(rx: &mut mpsc::Receiver<Notification>) -> Notification {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no update in time")
            .expect("channel closed")
    }

    fn request() -> CreateTaskRequest {
        CreateTaskRequest::new("t", TaskKind::Prebuilt)
    }

    #[tokio::test]
    async fn test_task_subscription_emits_changes_only() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = setup(&dir).await;
        let id = store.create(request()).await.unwrap().id;

        let (observer, mut rx) = hub.connect().await;
        hub.subscribe_task(&observer, id).await.unwrap();

        match next(&mut rx).await {
            Notification::TaskUpdate(u) => assert_eq!(u.status, TaskStatus::Pending),
            other => panic!("unexpected {other:?}"),
        }

        // Nothing changed: several polls pass without an update.
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .is_err()
        );

        store.update_status(id, TaskStatus::Ready, None).await;
        match next(&mut rx).await {
            Notification::TaskUpdate(u) => assert_eq!(u.status, TaskStatus::Ready),
            other => panic!("unexpected {other:?}"),
        }
        hub.disconnect(&observer).await;
    }

    #[tokio::test]
    async fn test_task_subscription_ends_on_terminal_status() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = setup(&dir).await;
        let id = store.create(request()).await.unwrap().id;
        store
            .update_status(id, TaskStatus::Failed, Some("build failed".into()))
            .await;

        let (observer, mut rx) = hub.connect().await;
        hub.subscribe_task(&observer, id).await.unwrap();

        let update = next(&mut rx).await;
        assert!(update.is_final());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hub.active_subscriptions(&observer).await, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dashboard_subscription() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = setup(&dir).await;
        store.create(request()).await.unwrap();

        let (observer, mut rx) = hub.connect().await;
        hub.subscribe_dashboard(&observer).await.unwrap();

        match next(&mut rx).await {
            Notification::DashboardUpdate(u) => {
                assert_eq!(u.stats.total_tasks, 1);
                assert_eq!(u.stats.by_status.pending, 1);
            }
            other => panic!("unexpected {other:?}"),
        }

        store.create(request()).await.unwrap();
        match next(&mut rx).await {
            Notification::DashboardUpdate(u) => assert_eq!(u.stats.total_tasks, 2),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnect_cancels_all_subscriptions() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = setup(&dir).await;
        let id = store.create(request()).await.unwrap().id;

        let (observer, _rx) = hub.connect().await;
        hub.subscribe_task(&observer, id).await.unwrap();
        hub.subscribe_dashboard(&observer).await.unwrap();
        assert_eq!(hub.active_subscriptions(&observer).await, 2);

        assert!(hub.disconnect(&observer).await);
        assert_eq!(hub.observer_count().await, 0);
        assert!(!hub.disconnect(&observer).await);
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = setup(&dir).await;
        let id = store.create(request()).await.unwrap().id;

        let (observer, mut rx) = hub.connect().await;
        let sub = hub.subscribe_task(&observer, id).await.unwrap();
        next(&mut rx).await;

        hub.unsubscribe(&observer, &sub).await.unwrap();
        assert!(matches!(
            hub.unsubscribe(&observer, &sub).await,
            Err(HubError::SubscriptionNotFound(_))
        ));

        store.update_status(id, TaskStatus::Ready, None).await;
        assert!(
            tokio::time::timeout(Duration::from_millis(100), rx.recv())
                .await
                .map_or(true, |n| n.is_none())
        );
    }

    #[tokio::test]
    async fn test_subscribe_errors() {
        let dir = TempDir::new().unwrap();
        let (_store, hub) = setup(&dir).await;

        let ghost = ObserverId::generate();
        assert!(matches!(
            hub.subscribe_dashboard(&ghost).await,
            Err(HubError::ObserverNotFound(_))
        ));

        let (observer, _rx) = hub.connect().await;
        assert!(matches!(
            hub.subscribe_task(&observer, TaskId::new(9)).await,
            Err(HubError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_receiver_ends_loops() {
        let dir = TempDir::new().unwrap();
        let (store, hub) = setup(&dir).await;
        let id = store.create(request()).await.unwrap().id;

        let (observer, rx) = hub.connect().await;
        hub.subscribe_task(&observer, id).await.unwrap();
        drop(rx);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hub.active_subscriptions(&observer).await, 0);
        hub.shutdown().await;
        assert_eq!(hub.observer_count().await, 0);
    }
}
