//! Content-addressed storage for job bundles (C4): write-once artifact blobs keyed
//! by `(slug, version)`, plus time-limited download URLs for both storage backends.

pub mod error;
pub mod local;
pub mod s3;
pub mod sanitize;
pub mod token;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use std::sync::Arc;

use buildit_config::system::StorageBackend;
use buildit_config::SystemConfig;
use buildit_core::bundle::JobBundleVersion;
use buildit_core::job::ArtifactStorageKind;

pub use error::{BundleStoreError, Result};
pub use local::LocalBundleStore;
pub use s3::S3BundleStore;

/// Build the configured backend: local filesystem or S3, per `SystemConfig::storage`.
pub async fn from_system_config(config: &SystemConfig) -> Arc<dyn BundleStore> {
    match &config.storage {
        StorageBackend::Local { root } => Arc::new(LocalBundleStore::new(
            root.clone(),
            config.signing_secret.clone(),
            config.preview.base_url.clone(),
        )),
        StorageBackend::S3(s3) => Arc::new(
            S3BundleStore::connect(
                s3.bucket.clone(),
                s3.region.clone(),
                s3.endpoint.clone(),
                s3.prefix.clone(),
            )
            .await,
        ),
    }
}

/// Outcome of writing a bundle artifact: where it landed and its integrity digest.
#[derive(Debug, Clone)]
pub struct PutResult {
    pub artifact_path: String,
    pub checksum: String,
    pub size: i64,
    pub storage: ArtifactStorageKind,
}

/// A time-limited URL for downloading a previously stored artifact.
#[derive(Debug, Clone)]
pub struct DownloadUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub storage: ArtifactStorageKind,
}

/// Storage for job-bundle artifacts, content-addressed by `(slug, version)`.
///
/// `put` is idempotent when the checksum of `data` matches what is already stored at
/// the computed path; otherwise it requires `force` to overwrite (the C5 recovery path).
#[async_trait]
pub trait BundleStore: Send + Sync {
    async fn put(
        &self,
        slug: &str,
        version: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
        force: bool,
    ) -> Result<PutResult>;

    /// Fetches the artifact for `bundle`. Implementations that back onto fallible local
    /// storage may rehydrate from `bundle.artifact_data` on a miss.
    async fn get(&self, bundle: &JobBundleVersion) -> Result<Bytes>;

    async fn delete(&self, artifact_path: &str) -> Result<()>;

    async fn create_download_url(
        &self,
        slug: &str,
        version: &str,
        artifact_path: &str,
        ttl_ms: i64,
    ) -> Result<DownloadUrl>;
}

pub(crate) fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
