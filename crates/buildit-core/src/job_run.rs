//! JobRun: one invocation of a JobDefinition, executed inside a sandbox child process.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Expired,
}

impl JobRunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobRunStatus::Succeeded
                | JobRunStatus::Failed
                | JobRunStatus::Canceled
                | JobRunStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRun {
    pub id: ResourceId,
    pub job_slug: String,
    pub status: JobRunStatus,
    pub parameters: Value,
    pub result: Option<Value>,
    pub error_message: Option<String>,
    pub logs_url: Option<String>,
    pub metrics: Option<Value>,
    pub context: Option<Value>,
    pub timeout_ms: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt: u32,
    /// Identity of the worker currently holding the visibility lease on this run.
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
