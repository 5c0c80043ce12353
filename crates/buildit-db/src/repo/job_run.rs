//! JobRun persistence: one invocation of a JobDefinition and its claim lifecycle.

use async_trait::async_trait;
use buildit_core::ResourceId;
use buildit_core::job_run::{JobRun, JobRunStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobRunRow {
    pub id: uuid::Uuid,
    pub job_slug: String,
    pub status: JobRunStatus,
    pub parameters: serde_json::Value,
    pub result: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub logs_url: Option<String>,
    pub metrics: Option<serde_json::Value>,
    pub context: Option<serde_json::Value>,
    pub timeout_ms: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt: i32,
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<JobRunRow> for JobRun {
    fn from(row: JobRunRow) -> Self {
        JobRun {
            id: ResourceId::from_uuid(row.id),
            job_slug: row.job_slug,
            status: row.status,
            parameters: row.parameters,
            result: row.result,
            error_message: row.error_message,
            logs_url: row.logs_url,
            metrics: row.metrics,
            context: row.context,
            timeout_ms: row.timeout_ms as u64,
            started_at: row.started_at,
            completed_at: row.completed_at,
            attempt: row.attempt as u32,
            claimed_by: row.claimed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
pub trait JobRunRepo: Send + Sync {
    async fn create(
        &self,
        job_slug: &str,
        parameters: serde_json::Value,
        timeout_ms: u64,
        context: Option<serde_json::Value>,
    ) -> DbResult<JobRun>;

    async fn get_by_id(&self, id: ResourceId) -> DbResult<JobRun>;

    async fn list_by_job(&self, job_slug: &str) -> DbResult<Vec<JobRun>>;

    /// Filtered listing backing `GET /job-runs`: `status`/`job_slug` narrow by column,
    /// `search` matches `job_slug` by substring, paged by `limit`/`offset`.
    async fn list_filtered(
        &self,
        status: Option<JobRunStatus>,
        job_slug: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<JobRun>>;

    /// Claim the oldest pending run, marking it `running` and leasing it to `worker_id`.
    /// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never double-claim.
    async fn claim_next(&self, worker_id: &str) -> DbResult<Option<JobRun>>;

    async fn complete(&self, id: ResourceId, result: serde_json::Value) -> DbResult<JobRun>;

    async fn fail(&self, id: ResourceId, error_message: &str, next_attempt: bool) -> DbResult<JobRun>;

    /// Merge a partial update (e.g. progress metrics) pushed by a running sandbox job.
    async fn update_metrics(&self, id: ResourceId, partial: serde_json::Value) -> DbResult<JobRun>;

    async fn cancel(&self, id: ResourceId) -> DbResult<JobRun>;

    async fn expire_stale(&self, older_than: DateTime<Utc>) -> DbResult<u64>;
}

pub struct PgJobRunRepo {
    pool: PgPool,
}

impl PgJobRunRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRunRepo for PgJobRunRepo {
    async fn create(
        &self,
        job_slug: &str,
        parameters: serde_json::Value,
        timeout_ms: u64,
        context: Option<serde_json::Value>,
    ) -> DbResult<JobRun> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            INSERT INTO job_runs (id, job_slug, status, parameters, timeout_ms, context, attempt, created_at, updated_at)
            VALUES ($1, $2, 'pending', $3, $4, $5, 0, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(job_slug)
        .bind(parameters)
        .bind(timeout_ms as i64)
        .bind(context)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: ResourceId) -> DbResult<JobRun> {
        let row = sqlx::query_as::<_, JobRunRow>("SELECT * FROM job_runs WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("job run {id}")))?;
        Ok(row.into())
    }

    async fn list_by_job(&self, job_slug: &str) -> DbResult<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            "SELECT * FROM job_runs WHERE job_slug = $1 ORDER BY created_at DESC",
        )
        .bind(job_slug)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_filtered(
        &self,
        status: Option<JobRunStatus>,
        job_slug: Option<&str>,
        search: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> DbResult<Vec<JobRun>> {
        let rows = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT * FROM job_runs
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::text IS NULL OR job_slug = $2)
              AND ($3::text IS NULL OR job_slug ILIKE '%' || $3 || '%')
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(status)
        .bind(job_slug)
        .bind(search)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn claim_next(&self, worker_id: &str) -> DbResult<Option<JobRun>> {
        let mut tx = self.pool.begin().await?;
        let candidate = sqlx::query_as::<_, JobRunRow>(
            r#"
            SELECT * FROM job_runs
            WHERE status = 'pending'
            ORDER BY created_at
            FOR UPDATE SKIP LOCKED
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some(candidate) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET status = 'running', claimed_by = $2, started_at = NOW(),
                attempt = attempt + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(candidate.id)
        .bind(worker_id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(row.into()))
    }

    async fn complete(&self, id: ResourceId, result: serde_json::Value) -> DbResult<JobRun> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET status = 'succeeded', result = $2, completed_at = NOW(), claimed_by = NULL, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(result)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn fail(&self, id: ResourceId, error_message: &str, next_attempt: bool) -> DbResult<JobRun> {
        let status = if next_attempt { "pending" } else { "failed" };
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET status = $2, error_message = $3, claimed_by = NULL, updated_at = NOW(),
                completed_at = CASE WHEN $2 = 'failed' THEN NOW() ELSE completed_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(status)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn update_metrics(&self, id: ResourceId, partial: serde_json::Value) -> DbResult<JobRun> {
        let row = sqlx::query_as::<_, JobRunRow>(
            r#"
            UPDATE job_runs
            SET metrics = COALESCE(metrics, '{}'::jsonb) || $2::jsonb, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(partial)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job run {id}")))?;
        Ok(row.into())
    }

    async fn cancel(&self, id: ResourceId) -> DbResult<JobRun> {
        let row = sqlx::query_as::<_, JobRunRow>(
            "UPDATE job_runs SET status = 'canceled', completed_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn expire_stale(&self, older_than: DateTime<Utc>) -> DbResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_runs
            SET status = 'expired', completed_at = NOW(), claimed_by = NULL, updated_at = NOW()
            WHERE status = 'running' AND started_at < $1
            "#,
        )
        .bind(older_than)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
