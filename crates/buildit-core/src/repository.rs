//! Repository catalog types: a tracked source project moving through ingestion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a repository's ingestion lifecycle.
///
/// Valid transitions: seed->pending->processing->ready, processing->failed, failed->pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Seed,
    Pending,
    Processing,
    Ready,
    Failed,
}

impl IngestStatus {
    /// Whether `self -> next` is a legal transition in the ingest-status DAG.
    pub fn can_transition_to(self, next: IngestStatus) -> bool {
        use IngestStatus::*;
        matches!(
            (self, next),
            (Seed, Pending)
                | (Pending, Processing)
                | (Processing, Ready)
                | (Processing, Failed)
                | (Failed, Pending)
        )
    }
}

impl std::fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IngestStatus::Seed => "seed",
            IngestStatus::Pending => "pending",
            IngestStatus::Processing => "processing",
            IngestStatus::Ready => "ready",
            IngestStatus::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A single `name -> default value` entry used to seed launch environments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchEnvTemplate {
    pub name: String,
    pub default_value: String,
}

/// Maximum number of launch env templates a repository may declare.
pub const MAX_LAUNCH_ENV_TEMPLATES: usize = 32;

/// A tracked source project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repository {
    /// Caller-chosen stable identifier.
    pub id: String,
    pub repo_url: String,
    pub name: String,
    pub description: Option<String>,
    pub dockerfile_path: Option<String>,
    pub ingest_status: IngestStatus,
    pub last_ingested_at: Option<DateTime<Utc>>,
    pub ingest_error: Option<String>,
    pub ingest_attempts: i32,
    pub launch_env_templates: Vec<LaunchEnvTemplate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Source of a repository tag: system-derived (from ingestion detection) or operator-set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TagSource {
    System,
    Operator,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryTag {
    pub key: String,
    pub value: String,
    pub source: TagSource,
}

/// A preview tile surfaced in the catalog UI (e.g. a screenshot or summary card).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewTile {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
}

/// An append-only log row recording one repository status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub id: crate::ResourceId,
    pub repository_id: String,
    pub status: IngestStatus,
    pub message: Option<String>,
    pub attempt: i32,
    pub commit_sha: Option<String>,
    pub duration_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Metadata detected while scanning a cloned repository during ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectedConfig {
    pub dockerfile_path: Option<String>,
    pub language: Option<String>,
    pub runtime: Option<String>,
    pub framework: Option<String>,
    pub category: Option<String>,
}
