//! Error type shared by the queue-consumer pipelines (C6-C10).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Db(#[from] buildit_db::DbError),

    #[error(transparent)]
    Core(#[from] buildit_core::Error),

    #[error(transparent)]
    Sandbox(#[from] buildit_sandbox::SandboxError),

    #[error(transparent)]
    BundleStore(#[from] buildit_bundle_store::error::BundleStoreError),

    #[error(transparent)]
    Queue(#[from] sqlx::Error),

    #[error("invalid queue payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SchedulerError {
    /// Best-effort truncated message for entity `error_message` columns (500-char cap).
    pub fn truncated_message(&self) -> String {
        let message = self.to_string();
        if message.len() <= 500 {
            message
        } else {
            message.chars().take(500).collect()
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
