//! Build persistence: one image-build attempt per row, logs appended in place.

use async_trait::async_trait;
use buildit_core::ResourceId;
use buildit_core::build::{Build, BuildStatus};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BuildRow {
    pub id: uuid::Uuid,
    pub repository_id: String,
    pub status: BuildStatus,
    pub logs: String,
    pub image_tag: Option<String>,
    pub error_message: Option<String>,
    pub commit_sha: Option<String>,
    pub git_branch: Option<String>,
    pub git_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
}

impl From<BuildRow> for Build {
    fn from(row: BuildRow) -> Self {
        Build {
            id: ResourceId::from_uuid(row.id),
            repository_id: row.repository_id,
            status: row.status,
            logs: row.logs,
            image_tag: row.image_tag,
            error_message: row.error_message,
            commit_sha: row.commit_sha,
            git_branch: row.git_branch,
            git_ref: row.git_ref,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_ms: row.duration_ms,
        }
    }
}

#[async_trait]
pub trait BuildRepo: Send + Sync {
    async fn create(
        &self,
        repository_id: &str,
        commit_sha: Option<&str>,
        git_branch: Option<&str>,
        git_ref: Option<&str>,
    ) -> DbResult<Build>;

    async fn get_by_id(&self, id: ResourceId) -> DbResult<Build>;

    async fn list_by_repository(&self, repository_id: &str) -> DbResult<Vec<Build>>;

    async fn latest_succeeded(&self, repository_id: &str) -> DbResult<Option<Build>>;

    async fn mark_running(&self, id: ResourceId) -> DbResult<Build>;

    async fn append_log(&self, id: ResourceId, chunk: &str) -> DbResult<()>;

    async fn complete(
        &self,
        id: ResourceId,
        status: BuildStatus,
        image_tag: Option<&str>,
        error_message: Option<&str>,
    ) -> DbResult<Build>;
}

pub struct PgBuildRepo {
    pool: PgPool,
}

impl PgBuildRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BuildRepo for PgBuildRepo {
    async fn create(
        &self,
        repository_id: &str,
        commit_sha: Option<&str>,
        git_branch: Option<&str>,
        git_ref: Option<&str>,
    ) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            INSERT INTO builds (id, repository_id, status, logs, commit_sha, git_branch, git_ref, created_at, updated_at)
            VALUES ($1, $2, 'pending', '', $3, $4, $5, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(repository_id)
        .bind(commit_sha)
        .bind(git_branch)
        .bind(git_ref)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: ResourceId) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>("SELECT * FROM builds WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("build {id}")))?;
        Ok(row.into())
    }

    async fn list_by_repository(&self, repository_id: &str) -> DbResult<Vec<Build>> {
        let rows = sqlx::query_as::<_, BuildRow>(
            "SELECT * FROM builds WHERE repository_id = $1 ORDER BY created_at DESC",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn latest_succeeded(&self, repository_id: &str) -> DbResult<Option<Build>> {
        let row = sqlx::query_as::<_, BuildRow>(
            "SELECT * FROM builds WHERE repository_id = $1 AND status = 'succeeded' ORDER BY completed_at DESC LIMIT 1",
        )
        .bind(repository_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn mark_running(&self, id: ResourceId) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(
            "UPDATE builds SET status = 'running', started_at = NOW(), updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn append_log(&self, id: ResourceId, chunk: &str) -> DbResult<()> {
        sqlx::query("UPDATE builds SET logs = logs || $2, updated_at = NOW() WHERE id = $1")
            .bind(id.as_uuid())
            .bind(chunk)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn complete(
        &self,
        id: ResourceId,
        status: BuildStatus,
        image_tag: Option<&str>,
        error_message: Option<&str>,
    ) -> DbResult<Build> {
        let row = sqlx::query_as::<_, BuildRow>(
            r#"
            UPDATE builds
            SET status = $2, image_tag = $3, error_message = $4, completed_at = NOW(),
                duration_ms = EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000, updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(status)
        .bind(image_tag)
        .bind(error_message)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }
}
