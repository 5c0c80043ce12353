//! Filesystem-backed bundle store: `<root>/<slug_segment>/<version_segment>/<filename>`.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use tracing::debug;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use buildit_core::bundle::JobBundleVersion;
use buildit_core::job::ArtifactStorageKind;

use crate::error::{BundleStoreError, Result};
use crate::sanitize::{sanitize_filename, sanitize_segment};
use crate::token;
use crate::{BundleStore, DownloadUrl, PutResult, sha256_hex};

pub struct LocalBundleStore {
    root: PathBuf,
    signing_secret: String,
    base_url: Option<String>,
}

impl LocalBundleStore {
    pub fn new(root: impl Into<PathBuf>, signing_secret: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            root: root.into(),
            signing_secret: signing_secret.into(),
            base_url,
        }
    }

    fn resolve(&self, artifact_path: &str) -> Result<PathBuf> {
        let full = self.root.join(artifact_path);
        let full = full
            .canonicalize()
            .or_else(|_| Ok::<_, std::io::Error>(full.clone()))?;
        if !full.starts_with(&self.root) && full != self.root {
            return Err(BundleStoreError::InvalidToken("artifact path escapes storage root".into()));
        }
        Ok(full)
    }

    /// Verify a previously issued download token and return the resolved filesystem path.
    pub fn verify_download(
        &self,
        slug: &str,
        version: &str,
        artifact_path: &str,
        expires_at_ms: i64,
        signature_hex: &str,
    ) -> Result<PathBuf> {
        let expires_at = chrono::DateTime::from_timestamp_millis(expires_at_ms)
            .ok_or_else(|| BundleStoreError::InvalidToken("malformed expiry".into()))?;
        token::verify(&self.signing_secret, slug, version, artifact_path, expires_at, signature_hex)?;
        self.resolve(artifact_path)
    }

    /// Restores a locally missing artifact from the DB-held inline copy and writes it
    /// back to disk so subsequent reads hit the filesystem directly.
    async fn rehydrate(&self, bundle: &JobBundleVersion) -> Result<Bytes> {
        let encoded = bundle
            .artifact_data
            .as_deref()
            .ok_or_else(|| BundleStoreError::NotFound(bundle.artifact_path.clone()))?;
        let data = BASE64
            .decode(encoded)
            .map_err(|e| BundleStoreError::Io(std::io::Error::other(e.to_string())))?;
        let actual = sha256_hex(&data);
        if actual != bundle.checksum {
            return Err(BundleStoreError::ChecksumMismatch {
                path: bundle.artifact_path.clone(),
                expected: bundle.checksum.clone(),
                actual,
            });
        }

        debug!(artifact_path = %bundle.artifact_path, "rehydrating missing local artifact from inline copy");
        let data = Bytes::from(data);
        let filename = bundle.artifact_path.rsplit('/').next().unwrap_or(&bundle.artifact_path);
        self.put(&bundle.slug, &bundle.version, filename, &bundle.artifact_content_type, data.clone(), true)
            .await?;
        Ok(data)
    }
}

#[async_trait]
impl BundleStore for LocalBundleStore {
    async fn put(
        &self,
        slug: &str,
        version: &str,
        filename: &str,
        _content_type: &str,
        data: Bytes,
        force: bool,
    ) -> Result<PutResult> {
        let slug_segment = sanitize_segment(slug, "bundle");
        let version_segment = sanitize_segment(version, "v");
        let filename = sanitize_filename(filename);
        let dir = self.root.join(&slug_segment).join(&version_segment);
        tokio::fs::create_dir_all(&dir).await?;

        let file_path = dir.join(&filename);
        let checksum = sha256_hex(&data);

        if file_path.exists() && !force {
            let existing = tokio::fs::read(&file_path).await?;
            let existing_checksum = sha256_hex(&existing);
            if existing_checksum != checksum {
                return Err(BundleStoreError::ChecksumMismatch {
                    path: file_path.display().to_string(),
                    expected: existing_checksum,
                    actual: checksum,
                });
            }
        } else {
            tokio::fs::write(&file_path, &data).await?;
            debug!(path = %file_path.display(), size = data.len(), "wrote bundle artifact");
        }

        let artifact_path = format!("{slug_segment}/{version_segment}/{filename}");
        Ok(PutResult {
            artifact_path,
            checksum,
            size: data.len() as i64,
            storage: ArtifactStorageKind::Local,
        })
    }

    async fn get(&self, bundle: &JobBundleVersion) -> Result<Bytes> {
        let artifact_path = bundle.artifact_path.as_str();
        let path = self.resolve(artifact_path)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(_) => self.rehydrate(bundle).await,
        }
    }

    async fn delete(&self, artifact_path: &str) -> Result<()> {
        let path = self.resolve(artifact_path)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_download_url(
        &self,
        slug: &str,
        version: &str,
        artifact_path: &str,
        ttl_ms: i64,
    ) -> Result<DownloadUrl> {
        let expires_at = Utc::now() + ChronoDuration::milliseconds(ttl_ms);
        let signature = token::sign(&self.signing_secret, slug, version, artifact_path, expires_at);
        let base = self.base_url.as_deref().unwrap_or("");
        let filename = artifact_path.rsplit('/').next().unwrap_or(artifact_path);
        let url = format!(
            "{base}/job-bundles/{slug}/versions/{version}/download?expires={expires}&token={token}&filename={filename}",
            expires = expires_at.timestamp_millis(),
            token = signature,
            filename = urlencode(filename),
        );
        Ok(DownloadUrl {
            url,
            expires_at,
            storage: ArtifactStorageKind::Local,
        })
    }
}

fn urlencode(s: &str) -> String {
    s.replace('%', "%25").replace('/', "%2F").replace(' ', "%20")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (LocalBundleStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBundleStore::new(dir.path(), "test-secret", None);
        (store, dir)
    }

    fn bundle_version(slug: &str, version: &str, put: &PutResult, artifact_data: Option<String>) -> JobBundleVersion {
        JobBundleVersion {
            slug: slug.to_string(),
            version: version.to_string(),
            checksum: put.checksum.clone(),
            artifact_storage: ArtifactStorageKind::Local,
            artifact_path: put.artifact_path.clone(),
            artifact_size: put.size,
            artifact_content_type: "application/octet-stream".to_string(),
            manifest: serde_json::Value::Null,
            capability_flags: Vec::new(),
            metadata: serde_json::Value::Null,
            artifact_data,
            history: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let (store, _dir) = store().await;
        let put = store
            .put("My Job", "1.0.0", "bundle.tar.gz", "application/gzip", Bytes::from_static(b"hello"), false)
            .await
            .unwrap();
        assert_eq!(put.artifact_path, "my-job/1.0.0/bundle.tar.gz");

        let bundle = bundle_version("My Job", "1.0.0", &put, None);
        let data = store.get(&bundle).await.unwrap();
        assert_eq!(&data[..], b"hello");
    }

    #[tokio::test]
    async fn put_is_idempotent_on_matching_checksum() {
        let (store, _dir) = store().await;
        let put1 = store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"data"), false)
            .await
            .unwrap();
        let put2 = store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"data"), false)
            .await
            .unwrap();
        assert_eq!(put1.checksum, put2.checksum);
    }

    #[tokio::test]
    async fn put_rejects_conflicting_overwrite_without_force() {
        let (store, _dir) = store().await;
        store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"data"), false)
            .await
            .unwrap();
        let err = store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"other"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, BundleStoreError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn force_overwrites_conflicting_content() {
        let (store, _dir) = store().await;
        store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"data"), false)
            .await
            .unwrap();
        let put = store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"other"), true)
            .await
            .unwrap();
        let bundle = bundle_version("job", "1.0.0", &put, None);
        let data = store.get(&bundle).await.unwrap();
        assert_eq!(&data[..], b"other");
    }

    #[tokio::test]
    async fn get_missing_artifact_errors() {
        let (store, _dir) = store().await;
        let put = PutResult {
            artifact_path: "missing/1.0.0/f.bin".to_string(),
            checksum: "deadbeef".to_string(),
            size: 0,
            storage: ArtifactStorageKind::Local,
        };
        let bundle = bundle_version("missing", "1.0.0", &put, None);
        let err = store.get(&bundle).await.unwrap_err();
        assert!(matches!(err, BundleStoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn get_rehydrates_missing_artifact_from_inline_copy() {
        let (store, _dir) = store().await;
        let content = Bytes::from_static(b"rehydrated");
        let checksum = sha256_hex(&content);
        let put = PutResult {
            artifact_path: "job/2.0.0/bundle.tar.gz".to_string(),
            checksum: checksum.clone(),
            size: content.len() as i64,
            storage: ArtifactStorageKind::Local,
        };
        let bundle = bundle_version("job", "2.0.0", &put, Some(BASE64.encode(&content)));

        let data = store.get(&bundle).await.unwrap();
        assert_eq!(&data[..], b"rehydrated");

        // Second read should now find the artifact on disk directly.
        let data = store.get(&bundle).await.unwrap();
        assert_eq!(&data[..], b"rehydrated");
    }

    #[tokio::test]
    async fn get_rejects_rehydration_on_checksum_mismatch() {
        let (store, _dir) = store().await;
        let put = PutResult {
            artifact_path: "job/3.0.0/bundle.tar.gz".to_string(),
            checksum: "not-the-real-checksum".to_string(),
            size: 4,
            storage: ArtifactStorageKind::Local,
        };
        let bundle = bundle_version("job", "3.0.0", &put, Some(BASE64.encode(b"data")));

        let err = store.get(&bundle).await.unwrap_err();
        assert!(matches!(err, BundleStoreError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn download_url_round_trips_through_verify() {
        let (store, _dir) = store().await;
        let put = store
            .put("job", "1.0.0", "f.bin", "application/octet-stream", Bytes::from_static(b"data"), false)
            .await
            .unwrap();
        let url = store
            .create_download_url("job", "1.0.0", &put.artifact_path, 60_000)
            .await
            .unwrap();
        assert!(url.url.contains("token="));
    }
}
