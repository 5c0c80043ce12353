//! JobDefinition and JobBundleVersion persistence (C1's catalog of callable work).

use async_trait::async_trait;
use buildit_core::bundle::{ArtifactStorageKind, BundleHistoryEntry, JobBundleVersion};
use buildit_core::job::{JobDefinition, JobRuntime, RetryPolicy};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobDefinitionRow {
    pub slug: String,
    pub name: String,
    pub job_type: String,
    pub version: String,
    pub runtime: JobRuntime,
    pub entry_point: String,
    pub timeout_ms: i64,
    pub retry_policy: serde_json::Value,
    pub parameters_schema: Option<serde_json::Value>,
    pub default_parameters: serde_json::Value,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobDefinitionRow> for JobDefinition {
    type Error = DbError;

    fn try_from(row: JobDefinitionRow) -> Result<Self, Self::Error> {
        let retry_policy: RetryPolicy = serde_json::from_value(row.retry_policy)
            .map_err(|e| DbError::InvalidData(e.to_string()))?;
        Ok(JobDefinition {
            slug: row.slug,
            name: row.name,
            job_type: row.job_type,
            version: row.version,
            runtime: row.runtime,
            entry_point: row.entry_point,
            timeout_ms: row.timeout_ms as u64,
            retry_policy,
            parameters_schema: row.parameters_schema,
            default_parameters: row.default_parameters,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait JobDefinitionRepo: Send + Sync {
    async fn upsert(&self, def: &JobDefinition) -> DbResult<JobDefinition>;

    async fn get_by_slug(&self, slug: &str) -> DbResult<JobDefinition>;

    async fn list(&self) -> DbResult<Vec<JobDefinition>>;

    async fn set_entry_point(&self, slug: &str, entry_point: &str) -> DbResult<JobDefinition>;
}

pub struct PgJobDefinitionRepo {
    pool: PgPool,
}

impl PgJobDefinitionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobDefinitionRepo for PgJobDefinitionRepo {
    async fn upsert(&self, def: &JobDefinition) -> DbResult<JobDefinition> {
        let retry_json = serde_json::to_value(&def.retry_policy)
            .map_err(|e| DbError::InvalidData(e.to_string()))?;
        let row = sqlx::query_as::<_, JobDefinitionRow>(
            r#"
            INSERT INTO job_definitions (
                slug, name, job_type, version, runtime, entry_point, timeout_ms,
                retry_policy, parameters_schema, default_parameters, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
            ON CONFLICT (slug) DO UPDATE SET
                name = EXCLUDED.name, job_type = EXCLUDED.job_type, version = EXCLUDED.version,
                runtime = EXCLUDED.runtime, entry_point = EXCLUDED.entry_point,
                timeout_ms = EXCLUDED.timeout_ms, retry_policy = EXCLUDED.retry_policy,
                parameters_schema = EXCLUDED.parameters_schema,
                default_parameters = EXCLUDED.default_parameters, metadata = EXCLUDED.metadata,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&def.slug)
        .bind(&def.name)
        .bind(&def.job_type)
        .bind(&def.version)
        .bind(def.runtime)
        .bind(&def.entry_point)
        .bind(def.timeout_ms as i64)
        .bind(retry_json)
        .bind(&def.parameters_schema)
        .bind(&def.default_parameters)
        .bind(&def.metadata)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_by_slug(&self, slug: &str) -> DbResult<JobDefinition> {
        let row = sqlx::query_as::<_, JobDefinitionRow>(
            "SELECT * FROM job_definitions WHERE slug = $1",
        )
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job definition {slug}")))?;
        row.try_into()
    }

    async fn list(&self) -> DbResult<Vec<JobDefinition>> {
        let rows = sqlx::query_as::<_, JobDefinitionRow>(
            "SELECT * FROM job_definitions ORDER BY slug",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_entry_point(&self, slug: &str, entry_point: &str) -> DbResult<JobDefinition> {
        let row = sqlx::query_as::<_, JobDefinitionRow>(
            "UPDATE job_definitions SET entry_point = $2, updated_at = NOW() WHERE slug = $1 RETURNING *",
        )
        .bind(slug)
        .bind(entry_point)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound(format!("job definition {slug}")),
            other => DbError::Database(other),
        })?;
        row.try_into()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobBundleVersionRow {
    pub slug: String,
    pub version: String,
    pub checksum: String,
    pub artifact_storage: ArtifactStorageKind,
    pub artifact_path: String,
    pub artifact_size: i64,
    pub artifact_content_type: String,
    pub manifest: serde_json::Value,
    pub capability_flags: Vec<String>,
    pub metadata: serde_json::Value,
    pub artifact_data: Option<String>,
    pub history: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<JobBundleVersionRow> for JobBundleVersion {
    type Error = DbError;

    fn try_from(row: JobBundleVersionRow) -> Result<Self, Self::Error> {
        let history: Vec<BundleHistoryEntry> =
            serde_json::from_value(row.history).map_err(|e| DbError::InvalidData(e.to_string()))?;
        Ok(JobBundleVersion {
            slug: row.slug,
            version: row.version,
            checksum: row.checksum,
            artifact_storage: row.artifact_storage,
            artifact_path: row.artifact_path,
            artifact_size: row.artifact_size,
            artifact_content_type: row.artifact_content_type,
            manifest: row.manifest,
            capability_flags: row.capability_flags,
            metadata: row.metadata,
            artifact_data: row.artifact_data,
            history,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
pub trait JobBundleRepo: Send + Sync {
    async fn publish(&self, bundle: &JobBundleVersion) -> DbResult<JobBundleVersion>;

    async fn get(&self, slug: &str, version: &str) -> DbResult<JobBundleVersion>;

    async fn list_versions(&self, slug: &str) -> DbResult<Vec<JobBundleVersion>>;

    async fn append_history(
        &self,
        slug: &str,
        version: &str,
        entry: &BundleHistoryEntry,
    ) -> DbResult<()>;

    async fn version_exists(&self, slug: &str, version: &str) -> DbResult<bool>;
}

pub struct PgJobBundleRepo {
    pool: PgPool,
}

impl PgJobBundleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobBundleRepo for PgJobBundleRepo {
    async fn publish(&self, bundle: &JobBundleVersion) -> DbResult<JobBundleVersion> {
        let history_json =
            serde_json::to_value(&bundle.history).map_err(|e| DbError::InvalidData(e.to_string()))?;
        let row = sqlx::query_as::<_, JobBundleVersionRow>(
            r#"
            INSERT INTO job_bundle_versions (
                slug, version, checksum, artifact_storage, artifact_path, artifact_size,
                artifact_content_type, manifest, capability_flags, metadata, artifact_data,
                history, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(&bundle.slug)
        .bind(&bundle.version)
        .bind(&bundle.checksum)
        .bind(bundle.artifact_storage)
        .bind(&bundle.artifact_path)
        .bind(bundle.artifact_size)
        .bind(&bundle.artifact_content_type)
        .bind(&bundle.manifest)
        .bind(&bundle.capability_flags)
        .bind(&bundle.metadata)
        .bind(&bundle.artifact_data)
        .bind(history_json)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(dbe) if dbe.is_unique_violation() => {
                DbError::Duplicate(format!("job bundle {}@{}", bundle.slug, bundle.version))
            }
            _ => DbError::Database(e),
        })?;
        row.try_into()
    }

    async fn get(&self, slug: &str, version: &str) -> DbResult<JobBundleVersion> {
        let row = sqlx::query_as::<_, JobBundleVersionRow>(
            "SELECT * FROM job_bundle_versions WHERE slug = $1 AND version = $2",
        )
        .bind(slug)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("job bundle {slug}@{version}")))?;
        row.try_into()
    }

    async fn list_versions(&self, slug: &str) -> DbResult<Vec<JobBundleVersion>> {
        let rows = sqlx::query_as::<_, JobBundleVersionRow>(
            "SELECT * FROM job_bundle_versions WHERE slug = $1 ORDER BY created_at DESC",
        )
        .bind(slug)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn append_history(
        &self,
        slug: &str,
        version: &str,
        entry: &BundleHistoryEntry,
    ) -> DbResult<()> {
        let entry_json =
            serde_json::to_value(entry).map_err(|e| DbError::InvalidData(e.to_string()))?;
        sqlx::query(
            "UPDATE job_bundle_versions SET history = history || $3::jsonb, updated_at = NOW() WHERE slug = $1 AND version = $2",
        )
        .bind(slug)
        .bind(version)
        .bind(serde_json::Value::Array(vec![entry_json]))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn version_exists(&self, slug: &str, version: &str) -> DbResult<bool> {
        let row: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM job_bundle_versions WHERE slug = $1 AND version = $2",
        )
        .bind(slug)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }
}
