//! Repository catalog persistence: the tracked source project plus its tags,
//! preview tiles, and append-only ingestion history.

use async_trait::async_trait;
use buildit_core::repository::{
    IngestStatus, IngestionEvent, LaunchEnvTemplate, PreviewTile, Repository, RepositoryTag,
    TagSource,
};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepositoryRow {
    pub id: String,
    pub repo_url: String,
    pub name: String,
    pub description: Option<String>,
    pub dockerfile_path: Option<String>,
    pub ingest_status: IngestStatus,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub ingest_error: Option<String>,
    pub ingest_attempts: i32,
    pub launch_env_templates: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<RepositoryRow> for Repository {
    type Error = DbError;

    fn try_from(row: RepositoryRow) -> Result<Self, Self::Error> {
        let launch_env_templates: Vec<LaunchEnvTemplate> =
            serde_json::from_value(row.launch_env_templates)
                .map_err(|e| DbError::InvalidData(e.to_string()))?;
        Ok(Repository {
            id: row.id,
            repo_url: row.repo_url,
            name: row.name,
            description: row.description,
            dockerfile_path: row.dockerfile_path,
            ingest_status: row.ingest_status,
            last_ingested_at: row.last_ingested_at,
            ingest_error: row.ingest_error,
            ingest_attempts: row.ingest_attempts,
            launch_env_templates,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepositoryTagRow {
    pub repository_id: String,
    pub key: String,
    pub value: String,
    pub source: TagSource,
}

impl From<RepositoryTagRow> for RepositoryTag {
    fn from(row: RepositoryTagRow) -> Self {
        RepositoryTag {
            key: row.key,
            value: row.value,
            source: row.source,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PreviewTileRow {
    pub repository_id: String,
    pub position: i32,
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

impl From<PreviewTileRow> for PreviewTile {
    fn from(row: PreviewTileRow) -> Self {
        PreviewTile {
            title: row.title,
            description: row.description,
            image_url: row.image_url,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IngestionEventRow {
    pub id: uuid::Uuid,
    pub repository_id: String,
    pub status: IngestStatus,
    pub message: Option<String>,
    pub attempt: i32,
    pub commit_sha: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl From<IngestionEventRow> for IngestionEvent {
    fn from(row: IngestionEventRow) -> Self {
        IngestionEvent {
            id: buildit_core::ResourceId::from_uuid(row.id),
            repository_id: row.repository_id,
            status: row.status,
            message: row.message,
            attempt: row.attempt,
            commit_sha: row.commit_sha,
            duration_ms: row.duration_ms,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
pub trait RepositoryRepo: Send + Sync {
    async fn create(
        &self,
        id: &str,
        repo_url: &str,
        name: &str,
        description: Option<&str>,
        dockerfile_path: Option<&str>,
    ) -> DbResult<Repository>;

    async fn get_by_id(&self, id: &str) -> DbResult<Repository>;

    async fn list(&self) -> DbResult<Vec<Repository>>;

    /// Atomically move `ingest_status`; fails with `Conflict`-style `InvalidData` if the
    /// transition is not legal for the row's current status.
    async fn transition_ingest_status(
        &self,
        id: &str,
        next: IngestStatus,
        error: Option<&str>,
    ) -> DbResult<Repository>;

    async fn increment_ingest_attempts(&self, id: &str) -> DbResult<Repository>;

    async fn apply_detected_config(
        &self,
        id: &str,
        dockerfile_path: Option<&str>,
        last_ingested_at: DateTime<Utc>,
    ) -> DbResult<Repository>;

    async fn set_launch_env_templates(
        &self,
        id: &str,
        templates: &[LaunchEnvTemplate],
    ) -> DbResult<Repository>;

    /// Replace system-sourced tags and preview tiles atomically; operator tags are preserved.
    async fn replace_system_tags_and_previews(
        &self,
        id: &str,
        tags: &[(String, String)],
        previews: &[PreviewTile],
    ) -> DbResult<()>;

    async fn list_tags(&self, id: &str) -> DbResult<Vec<RepositoryTag>>;
    async fn list_previews(&self, id: &str) -> DbResult<Vec<PreviewTile>>;

    async fn append_ingestion_event(
        &self,
        repository_id: &str,
        status: IngestStatus,
        message: Option<&str>,
        attempt: i32,
        commit_sha: Option<&str>,
        duration_ms: Option<i64>,
    ) -> DbResult<IngestionEvent>;

    async fn list_ingestion_events(&self, repository_id: &str) -> DbResult<Vec<IngestionEvent>>;

    async fn delete(&self, id: &str) -> DbResult<()>;
}

pub struct PgRepositoryRepo {
    pool: PgPool,
}

impl PgRepositoryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RepositoryRepo for PgRepositoryRepo {
    async fn create(
        &self,
        id: &str,
        repo_url: &str,
        name: &str,
        description: Option<&str>,
        dockerfile_path: Option<&str>,
    ) -> DbResult<Repository> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            INSERT INTO repositories (id, repo_url, name, description, dockerfile_path,
                ingest_status, ingest_attempts, launch_env_templates, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'seed', 0, '[]'::jsonb, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(repo_url)
        .bind(name)
        .bind(description)
        .bind(dockerfile_path)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_by_id(&self, id: &str) -> DbResult<Repository> {
        let row = sqlx::query_as::<_, RepositoryRow>("SELECT * FROM repositories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("repository {id}")))?;
        row.try_into()
    }

    async fn list(&self) -> DbResult<Vec<Repository>> {
        let rows = sqlx::query_as::<_, RepositoryRow>(
            "SELECT * FROM repositories ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn transition_ingest_status(
        &self,
        id: &str,
        next: IngestStatus,
        error: Option<&str>,
    ) -> DbResult<Repository> {
        let current = self.get_by_id(id).await?;
        if !current.ingest_status.can_transition_to(next) {
            return Err(DbError::InvalidData(format!(
                "illegal ingest status transition {} -> {next}",
                current.ingest_status
            )));
        }
        let row = sqlx::query_as::<_, RepositoryRow>(
            r#"
            UPDATE repositories
            SET ingest_status = $2, ingest_error = $3, updated_at = NOW(),
                last_ingested_at = CASE WHEN $2 = 'ready' THEN NOW() ELSE last_ingested_at END
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(next)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn increment_ingest_attempts(&self, id: &str) -> DbResult<Repository> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "UPDATE repositories SET ingest_attempts = ingest_attempts + 1, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn apply_detected_config(
        &self,
        id: &str,
        dockerfile_path: Option<&str>,
        last_ingested_at: DateTime<Utc>,
    ) -> DbResult<Repository> {
        let row = sqlx::query_as::<_, RepositoryRow>(
            "UPDATE repositories SET dockerfile_path = $2, last_ingested_at = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(dockerfile_path)
        .bind(last_ingested_at)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn set_launch_env_templates(
        &self,
        id: &str,
        templates: &[LaunchEnvTemplate],
    ) -> DbResult<Repository> {
        let json = serde_json::to_value(templates).map_err(|e| DbError::InvalidData(e.to_string()))?;
        let row = sqlx::query_as::<_, RepositoryRow>(
            "UPDATE repositories SET launch_env_templates = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(json)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn replace_system_tags_and_previews(
        &self,
        id: &str,
        tags: &[(String, String)],
        previews: &[PreviewTile],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM repository_tags WHERE repository_id = $1 AND source = 'system'")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for (key, value) in tags {
            sqlx::query(
                "INSERT INTO repository_tags (repository_id, key, value, source) VALUES ($1, $2, $3, 'system')",
            )
            .bind(id)
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM repository_preview_tiles WHERE repository_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for (position, tile) in previews.iter().enumerate() {
            sqlx::query(
                "INSERT INTO repository_preview_tiles (repository_id, position, title, description, image_url) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(id)
            .bind(position as i32)
            .bind(&tile.title)
            .bind(&tile.description)
            .bind(&tile.image_url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_tags(&self, id: &str) -> DbResult<Vec<RepositoryTag>> {
        let rows = sqlx::query_as::<_, RepositoryTagRow>(
            "SELECT * FROM repository_tags WHERE repository_id = $1 ORDER BY key",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_previews(&self, id: &str) -> DbResult<Vec<PreviewTile>> {
        let rows = sqlx::query_as::<_, PreviewTileRow>(
            "SELECT * FROM repository_preview_tiles WHERE repository_id = $1 ORDER BY position",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_ingestion_event(
        &self,
        repository_id: &str,
        status: IngestStatus,
        message: Option<&str>,
        attempt: i32,
        commit_sha: Option<&str>,
        duration_ms: Option<i64>,
    ) -> DbResult<IngestionEvent> {
        let row = sqlx::query_as::<_, IngestionEventRow>(
            r#"
            INSERT INTO ingestion_events (id, repository_id, status, message, attempt, commit_sha, duration_ms, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(repository_id)
        .bind(status)
        .bind(message)
        .bind(attempt)
        .bind(commit_sha)
        .bind(duration_ms)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_ingestion_events(&self, repository_id: &str) -> DbResult<Vec<IngestionEvent>> {
        let rows = sqlx::query_as::<_, IngestionEventRow>(
            "SELECT * FROM ingestion_events WHERE repository_id = $1 ORDER BY created_at DESC",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM repositories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
