//! Service registry persistence: external endpoints launches can reference by slug.

use async_trait::async_trait;
use buildit_core::service::{Service, ServiceHealth};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceRow {
    pub slug: String,
    pub display_name: String,
    pub kind: String,
    pub base_url: Option<String>,
    pub status: ServiceHealth,
    pub status_message: Option<String>,
    pub capabilities: serde_json::Value,
    pub metadata: serde_json::Value,
    pub last_healthy_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ServiceRow> for Service {
    fn from(row: ServiceRow) -> Self {
        Service {
            slug: row.slug,
            display_name: row.display_name,
            kind: row.kind,
            base_url: row.base_url,
            status: row.status,
            status_message: row.status_message,
            capabilities: row.capabilities,
            metadata: row.metadata,
            last_healthy_at: row.last_healthy_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
pub trait ServiceRepo: Send + Sync {
    async fn upsert(
        &self,
        slug: &str,
        display_name: &str,
        kind: &str,
        base_url: Option<&str>,
    ) -> DbResult<Service>;

    async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Service>>;

    async fn list(&self) -> DbResult<Vec<Service>>;

    async fn update_health(
        &self,
        slug: &str,
        status: ServiceHealth,
        status_message: Option<&str>,
    ) -> DbResult<Service>;
}

pub struct PgServiceRepo {
    pool: PgPool,
}

impl PgServiceRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceRepo for PgServiceRepo {
    async fn upsert(
        &self,
        slug: &str,
        display_name: &str,
        kind: &str,
        base_url: Option<&str>,
    ) -> DbResult<Service> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            INSERT INTO services (slug, display_name, kind, base_url, status, capabilities, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'unknown', '{}'::jsonb, '{}'::jsonb, NOW(), NOW())
            ON CONFLICT (slug) DO UPDATE SET
                display_name = EXCLUDED.display_name, kind = EXCLUDED.kind,
                base_url = EXCLUDED.base_url, updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(slug)
        .bind(display_name)
        .bind(kind)
        .bind(base_url)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn get_by_slug(&self, slug: &str) -> DbResult<Option<Service>> {
        let row = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list(&self) -> DbResult<Vec<Service>> {
        let rows = sqlx::query_as::<_, ServiceRow>("SELECT * FROM services ORDER BY slug")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_health(
        &self,
        slug: &str,
        status: ServiceHealth,
        status_message: Option<&str>,
    ) -> DbResult<Service> {
        let row = sqlx::query_as::<_, ServiceRow>(
            r#"
            UPDATE services
            SET status = $2, status_message = $3, updated_at = NOW(),
                last_healthy_at = CASE WHEN $2 = 'healthy' THEN NOW() ELSE last_healthy_at END
            WHERE slug = $1
            RETURNING *
            "#,
        )
        .bind(slug)
        .bind(status)
        .bind(status_message)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => DbError::NotFound(format!("service {slug}")),
            other => DbError::Database(other),
        })?;
        Ok(row.into())
    }
}
