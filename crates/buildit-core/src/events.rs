//! Process-wide typed event bus (C3): fan-out of change events to WebSocket
//! subscribers and in-process listeners, generalized from a single-purpose
//! run/stage broadcaster into one shared, entity-agnostic channel.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::warn;

/// The kinds of change event published by C1 repositories and the pipelines built on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    RepositoryUpdated,
    RepositoryIngestionEvent,
    BuildUpdated,
    LaunchUpdated,
    ServiceUpdated,
    JobRunUpdated,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::RepositoryUpdated => "repository.updated",
            EventKind::RepositoryIngestionEvent => "repository.ingestion-event",
            EventKind::BuildUpdated => "build.updated",
            EventKind::LaunchUpdated => "launch.updated",
            EventKind::ServiceUpdated => "service.updated",
            EventKind::JobRunUpdated => "jobRun.updated",
        }
    }
}

/// One change notification: a kind plus the JSON-serialized entity post-image.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    #[serde(rename = "type", serialize_with = "serialize_kind")]
    pub kind: EventKind,
    pub data: Value,
}

fn serialize_kind<S: serde::Serializer>(kind: &EventKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

impl ChangeEvent {
    pub fn new(kind: EventKind, data: impl Serialize) -> Self {
        let data = serde_json::to_value(data).unwrap_or(Value::Null);
        Self { kind, data }
    }
}

/// Bounded broadcast channel. A slow or disconnected subscriber drops events and
/// continues rather than applying backpressure to publishers; truth lives in the database.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error; ignore the send failure.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Drain-and-log helper for in-process listeners that only care about side effects
/// (e.g. the ingestion pipeline optionally enqueuing a build after a status change).
pub async fn next_or_warn(rx: &mut broadcast::Receiver<ChangeEvent>) -> Option<ChangeEvent> {
    match rx.recv().await {
        Ok(event) => Some(event),
        Err(broadcast::error::RecvError::Lagged(n)) => {
            warn!(skipped = n, "event bus subscriber lagged, dropping events");
            None
        }
        Err(broadcast::error::RecvError::Closed) => None,
    }
}
