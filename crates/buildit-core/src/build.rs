//! Build entity: one container-image build attempt for a repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ResourceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BuildStatus::Succeeded | BuildStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: ResourceId,
    pub repository_id: String,
    pub status: BuildStatus,
    /// Append-only build log text; only ever grown, never rewritten.
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

impl Build {
    /// Last 4096 bytes of the log text, the preview exposed by the API.
    pub fn log_preview(&self) -> &str {
        let max = 4096;
        if self.logs.len() <= max {
            &self.logs
        } else {
            let start = self.logs.len() - max;
            // Back off to a char boundary so we never split a multi-byte UTF-8 sequence.
            let mut start = start;
            while start < self.logs.len() && !self.logs.is_char_boundary(start) {
                start += 1;
            }
            &self.logs[start..]
        }
    }
}
