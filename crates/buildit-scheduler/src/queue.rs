//! Named durable queue abstraction (C2): Postgres-backed broker mode with a
//! visibility-timeout lease, or an in-process inline mode for tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use buildit_core::ResourceId;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tokio::sync::Mutex;

/// Workload classes that each get their own durable queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum QueueName {
    Ingest,
    Build,
    LaunchStart,
    LaunchStop,
    JobRun,
}

impl QueueName {
    pub fn as_str(self) -> &'static str {
        match self {
            QueueName::Ingest => "ingest",
            QueueName::Build => "build",
            QueueName::LaunchStart => "launch-start",
            QueueName::LaunchStop => "launch-stop",
            QueueName::JobRun => "job-run",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QueueMessage {
    pub id: uuid::Uuid,
    pub queue: QueueName,
    pub payload: serde_json::Value,
    pub status: String,
    pub attempts: i32,
    pub visible_at: DateTime<Utc>,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct EnqueueOptions {
    pub delay: Option<std::time::Duration>,
}

impl Default for EnqueueOptions {
    fn default() -> Self {
        Self { delay: None }
    }
}

/// Default lease duration before an unacked message becomes visible again.
const VISIBILITY_TIMEOUT_SECS: i64 = 60;

#[async_trait]
pub trait Queue: Send + Sync {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<ResourceId, sqlx::Error>;

    /// Reserve the next visible message, leasing it to `worker_id` for the visibility window.
    async fn reserve_next(
        &self,
        queue: QueueName,
        worker_id: &str,
    ) -> Result<Option<QueueMessage>, sqlx::Error>;

    async fn ack(&self, message_id: uuid::Uuid) -> Result<(), sqlx::Error>;

    /// Negative-acknowledge: requeue after `requeue_delay`, or drop to dead state once the
    /// message has exceeded a caller-tracked retry budget.
    async fn nack(
        &self,
        message_id: uuid::Uuid,
        requeue_delay: Option<std::time::Duration>,
    ) -> Result<(), sqlx::Error>;
}

/// Postgres-durable broker mode: `FOR UPDATE SKIP LOCKED` claim on a visibility-timestamp
/// column, the same shape as the single-queue job claim cycle generalized to five queues.
pub struct PgQueue {
    pool: PgPool,
}

impl PgQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Queue for PgQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        options: EnqueueOptions,
    ) -> Result<ResourceId, sqlx::Error> {
        let id = uuid::Uuid::now_v7();
        let visible_at = Utc::now()
            + options
                .delay
                .map(|d| ChronoDuration::milliseconds(d.as_millis() as i64))
                .unwrap_or_default();
        sqlx::query(
            r#"
            INSERT INTO queue_messages (id, queue, payload, status, attempts, visible_at, created_at)
            VALUES ($1, $2, $3, 'pending', 0, $4, NOW())
            "#,
        )
        .bind(id)
        .bind(queue)
        .bind(payload)
        .bind(visible_at)
        .execute(&self.pool)
        .await?;
        Ok(ResourceId::from_uuid(id))
    }

    async fn reserve_next(
        &self,
        queue: QueueName,
        worker_id: &str,
    ) -> Result<Option<QueueMessage>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        let candidate = sqlx::query_as::<_, QueueMessage>(
            r#"
            SELECT * FROM queue_messages
            WHERE queue = $1 AND status = 'pending' AND visible_at <= NOW()
            ORDER BY created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .bind(queue)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let lease_until = Utc::now() + ChronoDuration::seconds(VISIBILITY_TIMEOUT_SECS);
        let row = sqlx::query_as::<_, QueueMessage>(
            r#"
            UPDATE queue_messages
            SET status = 'reserved', claimed_by = $2, visible_at = $3, attempts = attempts + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(candidate.id)
        .bind(worker_id)
        .bind(lease_until)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(row))
    }

    async fn ack(&self, message_id: uuid::Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE queue_messages SET status = 'done' WHERE id = $1")
            .bind(message_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn nack(
        &self,
        message_id: uuid::Uuid,
        requeue_delay: Option<std::time::Duration>,
    ) -> Result<(), sqlx::Error> {
        let visible_at = Utc::now()
            + requeue_delay
                .map(|d| ChronoDuration::milliseconds(d.as_millis() as i64))
                .unwrap_or_default();
        sqlx::query(
            "UPDATE queue_messages SET status = 'pending', claimed_by = NULL, visible_at = $2 WHERE id = $1",
        )
        .bind(message_id)
        .bind(visible_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

type InlineConsumer = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// In-process mode: `enqueue` awaits the registered consumer closure in place before
/// returning, bypassing Postgres entirely. Used in tests and in single-process deployments.
#[derive(Clone, Default)]
pub struct InlineQueue {
    consumers: Arc<Mutex<HashMap<QueueName, InlineConsumer>>>,
}

impl InlineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, queue: QueueName, consumer: InlineConsumer) {
        self.consumers.lock().await.insert(queue, consumer);
    }
}

#[async_trait]
impl Queue for InlineQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        payload: serde_json::Value,
        _options: EnqueueOptions,
    ) -> Result<ResourceId, sqlx::Error> {
        let consumer = self.consumers.lock().await.get(&queue).cloned();
        if let Some(consumer) = consumer {
            consumer(payload).await;
        }
        Ok(ResourceId::new())
    }

    async fn reserve_next(
        &self,
        _queue: QueueName,
        _worker_id: &str,
    ) -> Result<Option<QueueMessage>, sqlx::Error> {
        Ok(None)
    }

    async fn ack(&self, _message_id: uuid::Uuid) -> Result<(), sqlx::Error> {
        Ok(())
    }

    async fn nack(
        &self,
        _message_id: uuid::Uuid,
        _requeue_delay: Option<std::time::Duration>,
    ) -> Result<(), sqlx::Error> {
        Ok(())
    }
}
