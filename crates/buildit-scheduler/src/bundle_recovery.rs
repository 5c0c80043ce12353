//! Bundle recovery (C5): rebuilds a job bundle version the job engine could not find,
//! using an AI-builder suggestion embedded in the job definition's metadata.
//!
//! Two outcomes on success: the missing version is re-packaged and restored byte-for-byte
//! (checksums match the recorded row), or a new version is synthesized, published, and the
//! job definition's entry point is advanced to point at it. If no suggestion is available,
//! or packaging still can't reproduce something publishable, recovery fails and the job run
//! is surfaced as unrecoverable.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use buildit_bundle_store::BundleStore;
use buildit_core::bundle::{
    BundleHistoryEntry, BundleHistorySource, BundleSource, JobBundleVersion, package_bundle,
};
use buildit_core::job::{bump_patch, regen_suffix_version, JobDefinition};
use buildit_db::{DbError, JobBundleRepo, JobDefinitionRepo};

use crate::error::{Result, SchedulerError};

/// Key under `JobDefinition.metadata` holding the `BundleSource` an AI builder suggested
/// for this job, consulted when the job's published version is missing.
const SUGGESTION_METADATA_KEY: &str = "bundle_suggestion";

/// Cap on patch-bump probes before falling back to an epoch-suffixed version, so a pathological
/// run of collisions can't loop recovery forever.
const MAX_VERSION_PROBE_ATTEMPTS: u32 = 20;

pub struct BundleRecovery {
    job_defs: Arc<dyn JobDefinitionRepo>,
    bundles: Arc<dyn JobBundleRepo>,
    store: Arc<dyn BundleStore>,
    /// When true, a restore whose repacked checksum disagrees with the recorded one is
    /// treated as unrecoverable rather than silently accepted.
    strict_checksum: bool,
}

impl BundleRecovery {
    pub fn new(
        job_defs: Arc<dyn JobDefinitionRepo>,
        bundles: Arc<dyn JobBundleRepo>,
        store: Arc<dyn BundleStore>,
        strict_checksum: bool,
    ) -> Self {
        Self {
            job_defs,
            bundles,
            store,
            strict_checksum,
        }
    }

    /// Attempt to recover `slug@version` for `job_def`. Only called once the job engine has
    /// already confirmed the version is missing from the catalog.
    pub async fn recover(
        &self,
        job_def: &JobDefinition,
        slug: &str,
        version: &str,
    ) -> Result<JobBundleVersion> {
        let suggestion = extract_suggestion(job_def).ok_or_else(|| {
            SchedulerError::Core(buildit_core::Error::BundleUnrecoverable(format!(
                "no AI-builder suggestion recorded for {slug}@{version}"
            )))
        })?;

        match self.bundles.get(slug, version).await {
            Ok(existing) => self.restore(existing, &suggestion).await,
            Err(DbError::NotFound(_)) => self.regenerate(job_def, &suggestion).await,
            Err(e) => Err(e.into()),
        }
    }

    /// Step 1: the row exists but its artifact is missing from storage. Re-pack the
    /// suggestion and, if the checksum matches (or checks are relaxed), write the bytes
    /// back under the existing version.
    async fn restore(&self, existing: JobBundleVersion, suggestion: &BundleSource) -> Result<JobBundleVersion> {
        let (tarball, checksum) = package_bundle(suggestion).map_err(SchedulerError::Core)?;

        if self.strict_checksum && checksum != existing.checksum {
            return Err(SchedulerError::Core(buildit_core::Error::ChecksumMismatch {
                expected: existing.checksum.clone(),
                actual: checksum,
            }));
        }

        let filename = format!("{}-{}.tar.gz", existing.slug, existing.version);
        self.store
            .put(
                &existing.slug,
                &existing.version,
                &filename,
                "application/gzip",
                tarball.into(),
                true,
            )
            .await?;

        let entry = BundleHistoryEntry {
            source: BundleHistorySource::Restored,
            checksum,
            at: chrono::Utc::now(),
        };
        self.bundles
            .append_history(&existing.slug, &existing.version, &entry)
            .await?;

        Ok(existing)
    }

    /// Step 2: no row at all. Synthesize a fresh version, publish it, and repoint the job
    /// definition's entry point at it.
    async fn regenerate(&self, job_def: &JobDefinition, suggestion: &BundleSource) -> Result<JobBundleVersion> {
        let (tarball, checksum) = package_bundle(suggestion).map_err(SchedulerError::Core)?;

        let version = self.next_unused_version(&job_def.slug, &suggestion.manifest.version).await?;
        let filename = format!("{}-{}.tar.gz", job_def.slug, version);
        let put_result = self
            .store
            .put(
                &job_def.slug,
                &version,
                &filename,
                "application/gzip",
                tarball.into(),
                false,
            )
            .await?;

        let manifest = serde_json::to_value(suggestion.manifest.clone().normalized())
            .map_err(SchedulerError::from)?;

        let published = JobBundleVersion {
            slug: job_def.slug.clone(),
            version: version.clone(),
            checksum,
            artifact_storage: put_result.storage,
            artifact_path: put_result.artifact_path,
            artifact_size: put_result.size,
            artifact_content_type: "application/gzip".to_string(),
            manifest,
            capability_flags: suggestion.manifest.capabilities.clone(),
            metadata: serde_json::Value::Null,
            artifact_data: None,
            history: vec![BundleHistoryEntry {
                source: BundleHistorySource::Regenerated,
                checksum: put_result.checksum.clone(),
                at: chrono::Utc::now(),
            }],
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };
        let published = self.bundles.publish(&published).await?;

        self.job_defs
            .set_entry_point(&job_def.slug, &format!("bundle:{}@{}", job_def.slug, version))
            .await?;

        Ok(published)
    }

    /// Probe `base_version`, then successive patch bumps, for one not already published.
    /// Falls back to an epoch-suffixed variant if every probe collides or the base version
    /// doesn't parse as strict semver.
    async fn next_unused_version(&self, slug: &str, base_version: &str) -> Result<String> {
        let mut candidate = base_version.to_string();
        for _ in 0..MAX_VERSION_PROBE_ATTEMPTS {
            if !self.bundles.version_exists(slug, &candidate).await? {
                return Ok(candidate);
            }
            candidate = match bump_patch(&candidate) {
                Some(next) => next,
                None => break,
            };
        }
        Ok(regen_suffix_version(base_version, epoch_ms()))
    }
}

fn extract_suggestion(job_def: &JobDefinition) -> Option<BundleSource> {
    job_def
        .metadata
        .get(SUGGESTION_METADATA_KEY)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildit_core::bundle::BundleManifest;
    use serde_json::json;

    fn job_def_with_metadata(metadata: serde_json::Value) -> JobDefinition {
        JobDefinition {
            slug: "demo".to_string(),
            name: "Demo".to_string(),
            job_type: "generic".to_string(),
            version: "1".to_string(),
            runtime: buildit_core::job::JobRuntime::Node,
            entry_point: "bundle:demo@1.0.0".to_string(),
            timeout_ms: 1000,
            retry_policy: Default::default(),
            parameters_schema: None,
            default_parameters: serde_json::Value::Null,
            metadata,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn extracts_embedded_suggestion() {
        let suggestion = BundleSource {
            manifest: BundleManifest {
                name: "demo".to_string(),
                version: "1.0.0".to_string(),
                entry: "index.js".to_string(),
                python_entry: None,
                main: Some("index.js".to_string()),
                runtime: Some("node".to_string()),
                capabilities: vec![],
            },
            files: vec![],
        };
        let job_def = job_def_with_metadata(json!({
            "bundle_suggestion": suggestion,
        }));
        assert!(extract_suggestion(&job_def).is_some());
    }

    #[test]
    fn missing_suggestion_yields_none() {
        let job_def = job_def_with_metadata(json!({}));
        assert!(extract_suggestion(&job_def).is_none());
    }
}
