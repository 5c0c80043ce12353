//! Generic queue-consumer polling loop (C2/C6-C10 glue): reserve -> handle -> ack/nack,
//! shared by every pipeline consumer so each one only implements `handle`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, warn};

use crate::error::SchedulerError;
use crate::queue::{InlineQueue, Queue, QueueName};

/// One pipeline stage's message handler. `queue_name` identifies which queue a
/// consumer is registered against when wiring up pollers/inline registrations.
#[async_trait]
pub trait PipelineConsumer: Send + Sync {
    fn queue_name(&self) -> QueueName;

    async fn handle(&self, payload: Value) -> Result<(), SchedulerError>;
}

/// Sleep between empty `reserve_next` polls.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// Sleep after a queue-level error (not a handler failure) before retrying.
const ERROR_BACKOFF: Duration = Duration::from_secs(5);
/// Delay before a nacked message becomes visible again.
const NACK_REQUEUE_DELAY: Duration = Duration::from_secs(10);

/// Runs forever, reserving and dispatching messages from `queue` for `consumer`.
/// Intended to be spawned as its own tokio task per worker.
pub async fn run_poll_loop(
    queue: Arc<dyn Queue>,
    worker_id: String,
    consumer: Arc<dyn PipelineConsumer>,
) {
    let name = consumer.queue_name();
    loop {
        let reserved = queue.reserve_next(name, &worker_id).await;
        let message = match reserved {
            Ok(Some(message)) => message,
            Ok(None) => {
                tokio::time::sleep(IDLE_POLL_INTERVAL).await;
                continue;
            }
            Err(e) => {
                error!(queue = name.as_str(), error = %e, "failed to reserve next queue message");
                tokio::time::sleep(ERROR_BACKOFF).await;
                continue;
            }
        };

        match consumer.handle(message.payload.clone()).await {
            Ok(()) => {
                if let Err(e) = queue.ack(message.id).await {
                    error!(queue = name.as_str(), message_id = %message.id, error = %e, "failed to ack queue message");
                }
            }
            Err(e) => {
                warn!(queue = name.as_str(), message_id = %message.id, error = %e, "pipeline consumer failed, nacking message");
                if let Err(e) = queue.nack(message.id, Some(NACK_REQUEUE_DELAY)).await {
                    error!(queue = name.as_str(), message_id = %message.id, error = %e, "failed to nack queue message");
                }
            }
        }
    }
}

/// Registers `consumer` against `inline` so `enqueue` calls await `consumer.handle` in
/// place before returning. Used in single-process/test deployments (`QueueMode::Inline`),
/// where callers rely on the handler having already run once `enqueue` completes.
pub async fn register_inline(inline: &InlineQueue, consumer: Arc<dyn PipelineConsumer>) {
    let name = consumer.queue_name();
    inline
        .register(
            name,
            Arc::new(move |payload: Value| {
                let consumer = consumer.clone();
                Box::pin(async move {
                    if let Err(e) = consumer.handle(payload).await {
                        error!(queue = name.as_str(), error = %e, "inline pipeline consumer failed");
                    }
                })
            }),
        )
        .await;
}
