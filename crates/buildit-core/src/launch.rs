//! Launch entity: a running preview instance started from a built image, plus
//! multi-service launch grouping (service networks).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LaunchStatus {
    Pending,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl LaunchStatus {
    /// Legal forward transitions; `Failed` is reachable from any non-terminal state.
    pub fn can_transition_to(self, next: LaunchStatus) -> bool {
        use LaunchStatus::*;
        matches!(
            (self, next),
            (Pending, Starting)
                | (Starting, Running)
                | (Running, Stopping)
                | (Starting, Stopping)
                | (Stopping, Stopped)
                | (Pending, Failed)
                | (Starting, Failed)
                | (Running, Failed)
                | (Stopping, Failed)
        )
    }
}

/// One environment variable entry. `value` may be a literal, or `from_service` may name
/// another service whose attribute should be substituted at resolution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvVar {
    pub key: String,
    pub value: Option<String>,
    pub from_service: Option<ServiceRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceAttribute {
    InstanceUrl,
    BaseUrl,
    Host,
    Port,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRef {
    pub service_slug: String,
    pub attribute: ServiceAttribute,
    pub fallback: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Launch {
    pub id: ResourceId,
    pub repository_id: String,
    pub build_id: ResourceId,
    pub status: LaunchStatus,
    pub instance_url: Option<String>,
    pub container_id: Option<String>,
    pub port: Option<i32>,
    pub resource_profile: Option<String>,
    pub env: Vec<EnvVar>,
    pub command: Option<Vec<String>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
}

/// A group of launches that must be started/stopped together in dependency order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceNetwork {
    pub id: ResourceId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One repository's membership in a service network, with ordering and dependency info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkMember {
    pub network_id: ResourceId,
    pub repository_id: String,
    pub launch_order: i32,
    pub wait_for_build: bool,
    pub env: Vec<EnvVar>,
    pub depends_on: Vec<String>,
}

/// Links one launch to the network it was started as part of, for unified stop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchMember {
    pub network_id: ResourceId,
    pub launch_id: ResourceId,
    pub repository_id: String,
}
