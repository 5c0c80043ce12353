use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("failed to spawn sandbox process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to write to sandbox stdin: {0}")]
    Stdin(#[source] std::io::Error),

    #[error("failed to read from sandbox stdout: {0}")]
    Stdout(#[source] std::io::Error),

    #[error("malformed sandbox protocol message: {0}")]
    Protocol(String),

    #[error("sandbox exited without producing a result")]
    NoResult,

    #[error("sandbox execution timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("sandbox job failed: {message}")]
    JobFailed {
        message: String,
        name: Option<String>,
        stack: Option<String>,
    },

    #[error("callback error: {0}")]
    Callback(String),
}

pub type Result<T> = std::result::Result<T, SandboxError>;
