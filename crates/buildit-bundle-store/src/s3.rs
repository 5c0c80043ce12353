//! S3-backed bundle store, selected when `BUILDIT_STORAGE_BACKEND=s3`.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use bytes::Bytes;
use chrono::Utc;
use std::time::Duration;

use buildit_core::bundle::JobBundleVersion;
use buildit_core::job::ArtifactStorageKind;

use crate::error::{BundleStoreError, Result};
use crate::sanitize::{sanitize_filename, sanitize_segment};
use crate::{BundleStore, DownloadUrl, PutResult, sha256_hex};

pub struct S3BundleStore {
    client: Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3BundleStore {
    pub fn new(client: Client, bucket: impl Into<String>, prefix: Option<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix,
        }
    }

    /// Build a client from the default AWS credential/region chain, optionally
    /// pointed at a custom endpoint (local S3-compatible storage in dev/test).
    pub async fn connect(bucket: impl Into<String>, region: Option<String>, endpoint: Option<String>, prefix: Option<String>) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(aws_sdk_s3::config::Region::new(region));
        }
        let shared_config = loader.load().await;
        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&shared_config);
        if let Some(endpoint) = endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint).force_path_style(true);
        }
        let client = Client::from_conf(s3_config_builder.build());
        Self::new(client, bucket, prefix)
    }

    fn key(&self, artifact_path: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), artifact_path),
            None => artifact_path.to_string(),
        }
    }
}

#[async_trait]
impl BundleStore for S3BundleStore {
    async fn put(
        &self,
        slug: &str,
        version: &str,
        filename: &str,
        content_type: &str,
        data: Bytes,
        force: bool,
    ) -> Result<PutResult> {
        let slug_segment = sanitize_segment(slug, "bundle");
        let version_segment = sanitize_segment(version, "v");
        let filename = sanitize_filename(filename);
        let artifact_path = format!("{slug_segment}/{version_segment}/{filename}");
        let key = self.key(&artifact_path);
        let checksum = sha256_hex(&data);

        if !force {
            let head = self.client.head_object().bucket(&self.bucket).key(&key).send().await;
            if let Ok(head) = head {
                let existing_checksum = head
                    .metadata()
                    .and_then(|m| m.get("sha256"))
                    .cloned()
                    .unwrap_or_default();
                if !existing_checksum.is_empty() && existing_checksum != checksum {
                    return Err(BundleStoreError::ChecksumMismatch {
                        path: key,
                        expected: existing_checksum,
                        actual: checksum,
                    });
                }
                if !existing_checksum.is_empty() {
                    return Ok(PutResult {
                        artifact_path,
                        checksum,
                        size: data.len() as i64,
                        storage: ArtifactStorageKind::S3,
                    });
                }
            }
        }

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(content_type)
            .metadata("sha256", &checksum)
            .body(data.clone().into())
            .send()
            .await
            .map_err(|e| BundleStoreError::S3(e.to_string()))?;

        Ok(PutResult {
            artifact_path,
            checksum,
            size: data.len() as i64,
            storage: ArtifactStorageKind::S3,
        })
    }

    async fn get(&self, bundle: &JobBundleVersion) -> Result<Bytes> {
        let artifact_path = bundle.artifact_path.as_str();
        let key = self.key(artifact_path);
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|_| BundleStoreError::NotFound(artifact_path.to_string()))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| BundleStoreError::S3(e.to_string()))?;
        Ok(data.into_bytes())
    }

    async fn delete(&self, artifact_path: &str) -> Result<()> {
        let key = self.key(artifact_path);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| BundleStoreError::S3(e.to_string()))?;
        Ok(())
    }

    async fn create_download_url(
        &self,
        _slug: &str,
        _version: &str,
        artifact_path: &str,
        ttl_ms: i64,
    ) -> Result<DownloadUrl> {
        let key = self.key(artifact_path);
        let ttl = Duration::from_millis(ttl_ms.max(0) as u64);
        let presign_config = PresigningConfig::expires_in(ttl).map_err(|e| BundleStoreError::S3(e.to_string()))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .presigned(presign_config)
            .await
            .map_err(|e| BundleStoreError::S3(e.to_string()))?;
        Ok(DownloadUrl {
            url: presigned.uri().to_string(),
            expires_at: Utc::now() + chrono::Duration::milliseconds(ttl_ms),
            storage: ArtifactStorageKind::S3,
        })
    }
}
