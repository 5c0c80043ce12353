//! JobBundleVersion: an immutable, content-addressed versioned artifact, plus the
//! manifest and packaging-input types used to build one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStorageKind {
    Local,
    S3,
}

/// The manifest embedded in a bundle tarball (and echoed into the DB row).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BundleManifest {
    pub name: String,
    pub version: String,
    pub entry: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub python_entry: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,
    pub runtime: Option<String>,
    pub capabilities: Vec<String>,
}

impl BundleManifest {
    /// Deduplicate and sort capabilities, the normalization step the packaging algorithm requires.
    pub fn normalized(mut self) -> Self {
        self.capabilities.sort();
        self.capabilities.dedup();
        self
    }
}

/// One file to be written into a packaged bundle directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleFileEntry {
    /// Relative path within the bundle directory. Must not be absolute or contain `..`.
    pub path: String,
    pub contents: FileContents,
    pub executable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum FileContents {
    Utf8 { text: String },
    Base64 { data: String },
}

/// Input to the deterministic packaging algorithm (C5): the manifest plus declared files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleSource {
    pub manifest: BundleManifest,
    pub files: Vec<BundleFileEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleHistorySource {
    Published,
    Restored,
    Regenerated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleHistoryEntry {
    pub source: BundleHistorySource,
    pub checksum: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobBundleVersion {
    pub slug: String,
    pub version: String,
    pub checksum: String,
    pub artifact_storage: ArtifactStorageKind,
    pub artifact_path: String,
    pub artifact_size: i64,
    pub artifact_content_type: String,
    pub manifest: Value,
    pub capability_flags: Vec<String>,
    pub metadata: Value,
    /// Inline copy of the artifact bytes (base64) kept for local-storage rehydration.
    pub artifact_data: Option<String>,
    pub history: Vec<BundleHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Capability flags a sandboxed bundle may request; gates module/network access in C9.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Fs,
    Network,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::Fs => "fs",
            Capability::Network => "network",
        }
    }

    pub fn parse_set(flags: &[String]) -> Vec<Capability> {
        flags
            .iter()
            .filter_map(|f| match f.as_str() {
                "fs" => Some(Capability::Fs),
                "network" => Some(Capability::Network),
                _ => None,
            })
            .collect()
    }
}

/// Deterministically package a [`BundleSource`] into a gzipped tarball (C5's packaging
/// algorithm): a normalized `manifest.json` plus every declared file, entries ordered
/// alphabetically by path so identical input always produces an identical checksum.
/// Returns the tarball bytes and its sha256 hex digest.
pub fn package_bundle(source: &BundleSource) -> crate::Result<(Vec<u8>, String)> {
    use std::io::Write;

    let manifest = source.manifest.clone().normalized();
    let manifest_json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| crate::Error::Internal(format!("failed to serialize bundle manifest: {e}")))?;

    let mut entries: Vec<(String, Vec<u8>, bool)> = vec![("manifest.json".to_string(), manifest_json, false)];
    for file in &source.files {
        if file.path.starts_with('/') || file.path.split('/').any(|seg| seg == "..") {
            return Err(crate::Error::Validation(format!(
                "bundle file path escapes the package root: {}",
                file.path
            )));
        }
        let bytes = match &file.contents {
            FileContents::Utf8 { text } => text.clone().into_bytes(),
            FileContents::Base64 { data } => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(data)
                    .map_err(|e| crate::Error::Validation(format!("invalid base64 in {}: {e}", file.path)))?
            }
        };
        entries.push((file.path.clone(), bytes, file.executable));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(gz);
    for (path, bytes, executable) in &entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(bytes.len() as u64);
        header.set_mode(if *executable { 0o755 } else { 0o644 });
        header.set_cksum();
        builder
            .append_data(&mut header, path, bytes.as_slice())
            .map_err(|e| crate::Error::Internal(format!("failed to append {path} to bundle tarball: {e}")))?;
    }
    let gz = builder
        .into_inner()
        .map_err(|e| crate::Error::Internal(format!("failed to finalize bundle tarball: {e}")))?;
    let mut tarball = gz
        .finish()
        .map_err(|e| crate::Error::Internal(format!("failed to flush bundle tarball: {e}")))?;
    tarball.flush().ok();

    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(&tarball);
    let checksum = hex::encode(hasher.finalize());

    Ok((tarball, checksum))
}
