//! Ingestion pipeline (C6): clone a repository, detect its Dockerfile and package
//! metadata, replace its system tags, and transition it into the catalog.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;
use tracing::info;

use buildit_core::events::{ChangeEvent, EventBus, EventKind};
use buildit_core::repository::{DetectedConfig, IngestStatus};
use buildit_db::{BuildRepo, RepositoryRepo};

use crate::error::{Result, SchedulerError};
use crate::poller::PipelineConsumer;
use crate::queue::{EnqueueOptions, Queue, QueueName};

#[derive(Debug, Deserialize)]
struct IngestMessage {
    repository_id: String,
}

pub struct IngestionConsumer {
    repos: Arc<dyn RepositoryRepo>,
    builds: Arc<dyn BuildRepo>,
    queue: Arc<dyn Queue>,
    events: Arc<EventBus>,
    work_dir: PathBuf,
}

impl IngestionConsumer {
    pub fn new(
        repos: Arc<dyn RepositoryRepo>,
        builds: Arc<dyn BuildRepo>,
        queue: Arc<dyn Queue>,
        events: Arc<EventBus>,
        work_dir: PathBuf,
    ) -> Self {
        Self {
            repos,
            builds,
            queue,
            events,
            work_dir,
        }
    }

    async fn run_ingestion(&self, repository_id: &str) -> Result<()> {
        let started = Instant::now();
        let repo = self.repos.get_by_id(repository_id).await?;
        if repo.ingest_status != IngestStatus::Pending {
            // Another worker already picked this up, or it isn't due; collapse the retry.
            return Ok(());
        }
        self.repos
            .transition_ingest_status(repository_id, IngestStatus::Processing, None)
            .await?;
        let attempt = self.repos.increment_ingest_attempts(repository_id).await?.ingest_attempts;

        match self.detect_and_apply(repository_id, &repo.repo_url).await {
            Ok((commit_sha, detected)) => {
                let dockerfile_path = repo
                    .dockerfile_path
                    .clone()
                    .or(detected.dockerfile_path.clone());
                self.repos
                    .apply_detected_config(repository_id, dockerfile_path.as_deref(), Utc::now())
                    .await?;

                let mut tags = Vec::new();
                if let Some(language) = &detected.language {
                    tags.push(("language".to_string(), language.clone()));
                }
                if let Some(runtime) = &detected.runtime {
                    tags.push(("runtime".to_string(), runtime.clone()));
                }
                if let Some(framework) = &detected.framework {
                    tags.push(("framework".to_string(), framework.clone()));
                }
                if let Some(category) = &detected.category {
                    tags.push(("category".to_string(), category.clone()));
                }
                self.repos
                    .replace_system_tags_and_previews(repository_id, &tags, &[])
                    .await?;

                let updated = self
                    .repos
                    .transition_ingest_status(repository_id, IngestStatus::Ready, None)
                    .await?;
                let duration_ms = started.elapsed().as_millis() as i64;
                let event = self
                    .repos
                    .append_ingestion_event(
                        repository_id,
                        IngestStatus::Ready,
                        None,
                        attempt,
                        commit_sha.as_deref(),
                        Some(duration_ms),
                    )
                    .await?;
                self.events.publish(ChangeEvent::new(EventKind::RepositoryUpdated, &updated));
                self.events
                    .publish(ChangeEvent::new(EventKind::RepositoryIngestionEvent, &event));

                let build_id = self.enqueue_build(repository_id, commit_sha.as_deref()).await?;
                info!(repository_id, %build_id, "enqueued build after ingestion");
                Ok(())
            }
            Err(e) => {
                let message = e.truncated_message();
                let duration_ms = started.elapsed().as_millis() as i64;
                let updated = self
                    .repos
                    .transition_ingest_status(repository_id, IngestStatus::Failed, Some(&message))
                    .await?;
                let event = self
                    .repos
                    .append_ingestion_event(
                        repository_id,
                        IngestStatus::Failed,
                        Some(&message),
                        attempt,
                        None,
                        Some(duration_ms),
                    )
                    .await?;
                self.events.publish(ChangeEvent::new(EventKind::RepositoryUpdated, &updated));
                self.events
                    .publish(ChangeEvent::new(EventKind::RepositoryIngestionEvent, &event));
                Err(e)
            }
        }
    }

    /// Clone at shallow depth and scan for Dockerfile/package metadata. Returns the
    /// resolved HEAD commit sha and the detected config.
    async fn detect_and_apply(
        &self,
        repository_id: &str,
        repo_url: &str,
    ) -> Result<(Option<String>, DetectedConfig)> {
        tokio::fs::create_dir_all(&self.work_dir).await?;
        let clone_path = self.work_dir.join(sanitize_dir_name(repository_id));
        if clone_path.exists() {
            tokio::fs::remove_dir_all(&clone_path).await?;
        }

        let output = Command::new("git")
            .args([
                "clone",
                "--depth",
                "1",
                "--single-branch",
                repo_url,
                clone_path.to_str().unwrap_or_default(),
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SchedulerError::Core(buildit_core::Error::DependencyFailed(format!(
                "git clone failed: {stderr}"
            ))));
        }

        let commit_sha = Command::new("git")
            .args(["-C", clone_path.to_str().unwrap_or_default(), "rev-parse", "HEAD"])
            .output()
            .await
            .ok()
            .filter(|o| o.status.success())
            .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string());

        let detected = scan_repository(&clone_path).await?;
        Ok((commit_sha, detected))
    }

    async fn enqueue_build(
        &self,
        repository_id: &str,
        commit_sha: Option<&str>,
    ) -> Result<buildit_core::ResourceId> {
        let build = self
            .builds
            .create(repository_id, commit_sha, None, None)
            .await?;
        let payload = serde_json::json!({ "build_id": build.id.to_string() });
        self.queue
            .enqueue(QueueName::Build, payload, EnqueueOptions::default())
            .await?;
        Ok(build.id)
    }
}

#[async_trait]
impl PipelineConsumer for IngestionConsumer {
    fn queue_name(&self) -> QueueName {
        QueueName::Ingest
    }

    async fn handle(&self, payload: Value) -> Result<()> {
        let message: IngestMessage = serde_json::from_value(payload)?;
        self.run_ingestion(&message.repository_id).await
    }
}

fn sanitize_dir_name(repository_id: &str) -> String {
    format!("{:x}", md5::compute(repository_id))
}

/// Recursively walk `root` looking for a Dockerfile and top-level package metadata files.
async fn scan_repository(root: &Path) -> Result<DetectedConfig> {
    let mut config = DetectedConfig::default();
    scan_directory(root, root, &mut config).await?;
    Ok(config)
}

fn scan_directory<'a>(
    base: &'a Path,
    current: &'a Path,
    config: &'a mut DetectedConfig,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();

            if path.is_dir() {
                if file_name.starts_with('.')
                    || matches!(file_name.as_ref(), "node_modules" | "target" | "vendor" | "__pycache__")
                {
                    continue;
                }
                scan_directory(base, &path, config).await?;
                continue;
            }

            if config.dockerfile_path.is_none()
                && (file_name == "Dockerfile" || file_name.starts_with("Dockerfile."))
            {
                config.dockerfile_path = Some(
                    path.strip_prefix(base)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .to_string(),
                );
            }

            match file_name.as_ref() {
                "package.json" if config.language.is_none() => {
                    config.language = Some("javascript".to_string());
                    config.runtime = Some("node".to_string());
                    if let Ok(contents) = tokio::fs::read_to_string(&path).await {
                        config.framework = detect_js_framework(&contents);
                    }
                }
                "go.mod" if config.language.is_none() => {
                    config.language = Some("go".to_string());
                    config.runtime = Some("go".to_string());
                }
                "Cargo.toml" if config.language.is_none() => {
                    config.language = Some("rust".to_string());
                    config.runtime = Some("native".to_string());
                }
                "requirements.txt" | "pyproject.toml" if config.language.is_none() => {
                    config.language = Some("python".to_string());
                    config.runtime = Some("python".to_string());
                }
                _ => {}
            }
        }
        Ok(())
    })
}

fn detect_js_framework(package_json: &str) -> Option<String> {
    let value: Value = serde_json::from_str(package_json).ok()?;
    let deps = value.get("dependencies")?.as_object()?;
    for framework in ["next", "nuxt", "remix", "react", "vue", "svelte"] {
        if deps.contains_key(framework) {
            return Some(framework.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_next_over_plain_react() {
        let pkg = r#"{"dependencies": {"next": "14.0.0", "react": "18.0.0"}}"#;
        assert_eq!(detect_js_framework(pkg), Some("next".to_string()));
    }

    #[test]
    fn detects_no_framework_without_hints() {
        let pkg = r#"{"dependencies": {"lodash": "4.0.0"}}"#;
        assert_eq!(detect_js_framework(pkg), None);
    }
}
