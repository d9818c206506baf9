//! Server-sent event stream of live updates.
//!
//! Each request becomes one hub observer. The observer is disconnected
//! (and its subscription loops cancelled) when the client goes away and
//! axum drops the stream.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures_util::stream::{self, Stream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use fuzzrun_core::{Notification, ObserverId, TaskId};

use crate::http::responses::{error, EventsQuery};
use crate::hub::{HubError, NotificationHub};
use crate::service::FuzzService;

/// Disconnects its observer when dropped.
struct ObserverGuard {
    hub: Arc<NotificationHub>,
    observer: ObserverId,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let hub = Arc::clone(&self.hub);
        let observer = self.observer.clone();
        tokio::spawn(async move {
            hub.disconnect(&observer).await;
        });
    }
}

/// Open a live update stream.
///
/// `?task=<id>` follows one task, `?dashboard=true` the dashboard; both may
/// be combined.
pub async fn events(
    State(service): State<Arc<FuzzService>>,
    Query(query): Query<EventsQuery>,
) -> Response {
    if query.task.is_none() && !query.dashboard {
        return error(
            StatusCode::BAD_REQUEST,
            "Specify task=<id> and/or dashboard=true",
        );
    }

    let hub = Arc::clone(service.hub());
    let (observer, rx) = hub.connect().await;
    let guard = ObserverGuard {
        hub: Arc::clone(&hub),
        observer: observer.clone(),
    };

    if let Some(task) = query.task {
        match hub.subscribe_task(&observer, TaskId::new(task)).await {
            Ok(_) => {}
            Err(e @ HubError::TaskNotFound(_)) => {
                return error(StatusCode::NOT_FOUND, e.to_string());
            }
            Err(e) => {
                warn!(observer = %observer, error = %e, "Failed to subscribe to task");
                return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
            }
        }
    }
    if query.dashboard {
        if let Err(e) = hub.subscribe_dashboard(&observer).await {
            warn!(observer = %observer, error = %e, "Failed to subscribe to dashboard");
            return error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string());
        }
    }

    Sse::new(notification_stream(rx, guard))
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn notification_stream(
    rx: mpsc::Receiver<Notification>,
    guard: ObserverGuard,
) -> impl Stream<Item = Result<Event, Infallible>> + Send {
    stream::unfold((rx, guard), |(mut rx, guard)| async move {
        let notification = rx.recv().await?;
        Some((Ok(to_event(&notification)), (rx, guard)))
    })
}

fn to_event(notification: &Notification) -> Event {
    let name = notification.event_name();
    Event::default()
        .event(name)
        .json_data(notification)
        .unwrap_or_else(|e| {
            debug!(event = name, error = %e, "Failed to encode notification");
            Event::default().event(name).comment("encoding error")
        })
}
