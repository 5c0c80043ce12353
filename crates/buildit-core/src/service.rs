//! Service entity: a registered external service endpoint that launches may reference.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    Unknown,
    Healthy,
    Degraded,
    Unreachable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub slug: String,
    pub display_name: String,
    pub kind: String,
    pub base_url: Option<String>,
    pub status: ServiceHealth,
    pub status_message: Option<String>,
    pub capabilities: Value,
    pub metadata: Value,
    pub last_healthy_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
