//! Launch persistence: running preview instances and the service networks that group them.

use async_trait::async_trait;
use buildit_core::ResourceId;
use buildit_core::launch::{EnvVar, Launch, LaunchStatus, NetworkMember, ServiceNetwork};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{DbError, DbResult};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LaunchRow {
    pub id: uuid::Uuid,
    pub repository_id: String,
    pub build_id: uuid::Uuid,
    pub status: LaunchStatus,
    pub instance_url: Option<String>,
    pub container_id: Option<String>,
    pub port: Option<i32>,
    pub resource_profile: Option<String>,
    pub env: serde_json::Value,
    pub command: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

impl TryFrom<LaunchRow> for Launch {
    type Error = DbError;

    fn try_from(row: LaunchRow) -> Result<Self, Self::Error> {
        let env: Vec<EnvVar> =
            serde_json::from_value(row.env).map_err(|e| DbError::InvalidData(e.to_string()))?;
        let command = row
            .command
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e: serde_json::Error| DbError::InvalidData(e.to_string()))?;
        Ok(Launch {
            id: ResourceId::from_uuid(row.id),
            repository_id: row.repository_id,
            build_id: ResourceId::from_uuid(row.build_id),
            status: row.status,
            instance_url: row.instance_url,
            container_id: row.container_id,
            port: row.port,
            resource_profile: row.resource_profile,
            env,
            command,
            error_message: row.error_message,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            stopped_at: row.stopped_at,
        })
    }
}

#[async_trait]
pub trait LaunchRepo: Send + Sync {
    async fn create(
        &self,
        repository_id: &str,
        build_id: ResourceId,
        env: &[EnvVar],
        resource_profile: Option<&str>,
        command: Option<&[String]>,
    ) -> DbResult<Launch>;

    async fn get_by_id(&self, id: ResourceId) -> DbResult<Launch>;

    async fn list_by_repository(&self, repository_id: &str) -> DbResult<Vec<Launch>>;

    async fn transition(
        &self,
        id: ResourceId,
        next: LaunchStatus,
        error: Option<&str>,
    ) -> DbResult<Launch>;

    async fn mark_running(
        &self,
        id: ResourceId,
        container_id: &str,
        port: Option<i32>,
        instance_url: &str,
    ) -> DbResult<Launch>;

    async fn mark_stopped(&self, id: ResourceId) -> DbResult<Launch>;
}

pub struct PgLaunchRepo {
    pool: PgPool,
}

impl PgLaunchRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LaunchRepo for PgLaunchRepo {
    async fn create(
        &self,
        repository_id: &str,
        build_id: ResourceId,
        env: &[EnvVar],
        resource_profile: Option<&str>,
        command: Option<&[String]>,
    ) -> DbResult<Launch> {
        let env_json = serde_json::to_value(env).map_err(|e| DbError::InvalidData(e.to_string()))?;
        let command_json = command
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| DbError::InvalidData(e.to_string()))?;
        let row = sqlx::query_as::<_, LaunchRow>(
            r#"
            INSERT INTO launches (id, repository_id, build_id, status, env, command, resource_profile, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', $4, $5, $6, NOW(), NOW())
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::now_v7())
        .bind(repository_id)
        .bind(build_id.as_uuid())
        .bind(env_json)
        .bind(command_json)
        .bind(resource_profile)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_by_id(&self, id: ResourceId) -> DbResult<Launch> {
        let row = sqlx::query_as::<_, LaunchRow>("SELECT * FROM launches WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("launch {id}")))?;
        row.try_into()
    }

    async fn list_by_repository(&self, repository_id: &str) -> DbResult<Vec<Launch>> {
        let rows = sqlx::query_as::<_, LaunchRow>(
            "SELECT * FROM launches WHERE repository_id = $1 ORDER BY created_at DESC",
        )
        .bind(repository_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn transition(
        &self,
        id: ResourceId,
        next: LaunchStatus,
        error: Option<&str>,
    ) -> DbResult<Launch> {
        let current = self.get_by_id(id).await?;
        if !current.status.can_transition_to(next) {
            return Err(DbError::InvalidData(format!(
                "illegal launch status transition {:?} -> {:?}",
                current.status, next
            )));
        }
        let row = sqlx::query_as::<_, LaunchRow>(
            "UPDATE launches SET status = $2, error_message = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id.as_uuid())
        .bind(next)
        .bind(error)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn mark_running(
        &self,
        id: ResourceId,
        container_id: &str,
        port: Option<i32>,
        instance_url: &str,
    ) -> DbResult<Launch> {
        let row = sqlx::query_as::<_, LaunchRow>(
            r#"
            UPDATE launches
            SET status = 'running', container_id = $2, port = $3, instance_url = $4,
                started_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .bind(container_id)
        .bind(port)
        .bind(instance_url)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn mark_stopped(&self, id: ResourceId) -> DbResult<Launch> {
        let row = sqlx::query_as::<_, LaunchRow>(
            r#"
            UPDATE launches
            SET status = 'stopped', instance_url = NULL, container_id = NULL, stopped_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceNetworkRow {
    pub id: uuid::Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<ServiceNetworkRow> for ServiceNetwork {
    fn from(row: ServiceNetworkRow) -> Self {
        ServiceNetwork {
            id: ResourceId::from_uuid(row.id),
            name: row.name,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NetworkMemberRow {
    pub network_id: uuid::Uuid,
    pub repository_id: String,
    pub launch_order: i32,
    pub wait_for_build: bool,
    pub env: serde_json::Value,
    pub depends_on: Vec<String>,
}

impl TryFrom<NetworkMemberRow> for NetworkMember {
    type Error = DbError;

    fn try_from(row: NetworkMemberRow) -> Result<Self, Self::Error> {
        let env: Vec<EnvVar> =
            serde_json::from_value(row.env).map_err(|e| DbError::InvalidData(e.to_string()))?;
        Ok(NetworkMember {
            network_id: ResourceId::from_uuid(row.network_id),
            repository_id: row.repository_id,
            launch_order: row.launch_order,
            wait_for_build: row.wait_for_build,
            env,
            depends_on: row.depends_on,
        })
    }
}

#[async_trait]
pub trait ServiceNetworkRepo: Send + Sync {
    async fn create(&self, name: &str) -> DbResult<ServiceNetwork>;

    async fn add_member(&self, member: &NetworkMember) -> DbResult<()>;

    async fn list_members(&self, network_id: ResourceId) -> DbResult<Vec<NetworkMember>>;

    async fn record_launch_member(
        &self,
        network_id: ResourceId,
        launch_id: ResourceId,
        repository_id: &str,
    ) -> DbResult<()>;
}

pub struct PgServiceNetworkRepo {
    pool: PgPool,
}

impl PgServiceNetworkRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ServiceNetworkRepo for PgServiceNetworkRepo {
    async fn create(&self, name: &str) -> DbResult<ServiceNetwork> {
        let row = sqlx::query_as::<_, ServiceNetworkRow>(
            "INSERT INTO service_networks (id, name, created_at) VALUES ($1, $2, NOW()) RETURNING *",
        )
        .bind(uuid::Uuid::now_v7())
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn add_member(&self, member: &NetworkMember) -> DbResult<()> {
        let env_json =
            serde_json::to_value(&member.env).map_err(|e| DbError::InvalidData(e.to_string()))?;
        sqlx::query(
            r#"
            INSERT INTO network_members (network_id, repository_id, launch_order, wait_for_build, env, depends_on)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(member.network_id.as_uuid())
        .bind(&member.repository_id)
        .bind(member.launch_order)
        .bind(member.wait_for_build)
        .bind(env_json)
        .bind(&member.depends_on)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_members(&self, network_id: ResourceId) -> DbResult<Vec<NetworkMember>> {
        let rows = sqlx::query_as::<_, NetworkMemberRow>(
            "SELECT * FROM network_members WHERE network_id = $1 ORDER BY launch_order",
        )
        .bind(network_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_launch_member(
        &self,
        network_id: ResourceId,
        launch_id: ResourceId,
        repository_id: &str,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO launch_members (network_id, launch_id, repository_id) VALUES ($1, $2, $3)",
        )
        .bind(network_id.as_uuid())
        .bind(launch_id.as_uuid())
        .bind(repository_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
