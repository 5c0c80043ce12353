use thiserror::Error;

#[derive(Debug, Error)]
pub enum BundleStoreError {
    #[error("artifact not found: {0}")]
    NotFound(String),

    #[error("checksum mismatch for existing artifact at {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("s3 error: {0}")]
    S3(String),

    #[error("invalid download token: {0}")]
    InvalidToken(String),
}

pub type Result<T> = std::result::Result<T, BundleStoreError>;
