//! Job engine (C10): runs one `JobRun` to completion inside a sandbox child process.
//!
//! Resolves the job's bundle (or inline entry point), acquires the bundle directory
//! through the shared cache, drives the sandbox, and applies the job's retry policy
//! on failure.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use buildit_bundle_store::BundleStore;
use buildit_config::system::SandboxConfig;
use buildit_core::bundle::{BundleManifest, Capability, JobBundleVersion};
use buildit_core::events::{ChangeEvent, EventBus, EventKind};
use buildit_core::job::{EntryPoint, JobDefinition, JobRuntime};
use buildit_core::job_run::JobRunStatus;
use buildit_core::sandbox::{SandboxBundleDescriptor, SandboxExecutionOptions, SandboxJobDescriptor};
use buildit_core::secret::SecretStore;
use buildit_core::ResourceId;
use buildit_db::{JobBundleRepo, JobDefinitionRepo, JobRunRepo};
use buildit_sandbox::{Sandbox, SandboxCallbacks};

use crate::bundle_cache::BundleCache;
use crate::bundle_recovery::BundleRecovery;
use crate::error::{Result, SchedulerError};
use crate::poller::PipelineConsumer;
use crate::queue::{EnqueueOptions, Queue, QueueName};

#[derive(Debug, Deserialize)]
struct JobRunMessage {
    job_run_id: String,
}

pub struct JobEngineConsumer {
    job_runs: Arc<dyn JobRunRepo>,
    job_defs: Arc<dyn JobDefinitionRepo>,
    bundles: Arc<dyn JobBundleRepo>,
    bundle_store: Arc<dyn BundleStore>,
    bundle_cache: Arc<BundleCache>,
    recovery: Arc<BundleRecovery>,
    secrets: Arc<dyn SecretStore>,
    sandbox: Arc<Sandbox>,
    queue: Arc<dyn Queue>,
    events: Arc<EventBus>,
    config: SandboxConfig,
}

impl JobEngineConsumer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        job_runs: Arc<dyn JobRunRepo>,
        job_defs: Arc<dyn JobDefinitionRepo>,
        bundles: Arc<dyn JobBundleRepo>,
        bundle_store: Arc<dyn BundleStore>,
        bundle_cache: Arc<BundleCache>,
        recovery: Arc<BundleRecovery>,
        secrets: Arc<dyn SecretStore>,
        sandbox: Arc<Sandbox>,
        queue: Arc<dyn Queue>,
        events: Arc<EventBus>,
        config: SandboxConfig,
    ) -> Self {
        Self {
            job_runs,
            job_defs,
            bundles,
            bundle_store,
            bundle_cache,
            recovery,
            secrets,
            sandbox,
            queue,
            events,
            config,
        }
    }

    async fn run(&self, run_id: ResourceId) -> Result<()> {
        let job_run = self.job_runs.get_by_id(run_id).await?;
        if job_run.status != JobRunStatus::Pending {
            return Ok(());
        }

        let job_def = self.job_defs.get_by_slug(&job_run.job_slug).await?;

        let outcome = self.drive(&job_def, run_id, job_run.parameters.clone(), job_run.context.clone()).await;

        match outcome {
            Ok(result) => {
                let completed = self.job_runs.complete(run_id, result).await?;
                self.events.publish(ChangeEvent::new(EventKind::JobRunUpdated, &completed));
                Ok(())
            }
            Err(e) => {
                let message = e.truncated_message();
                let attempt = job_run.attempt + 1;
                let retryable = matches!(&e, SchedulerError::Core(core) if core.is_retryable())
                    && job_def.retry_policy.should_retry(attempt);

                let updated = self.job_runs.fail(run_id, &message, retryable).await?;
                self.events.publish(ChangeEvent::new(EventKind::JobRunUpdated, &updated));

                if retryable {
                    let delay = job_def.retry_policy.delay_for_attempt(attempt);
                    self.queue
                        .enqueue(
                            QueueName::JobRun,
                            serde_json::json!({ "job_run_id": run_id.to_string() }),
                            EnqueueOptions { delay: Some(delay) },
                        )
                        .await
                        .map_err(SchedulerError::from)?;
                }
                Ok(())
            }
        }
    }

    async fn drive(
        &self,
        job_def: &JobDefinition,
        run_id: ResourceId,
        parameters: Value,
        context: Option<Value>,
    ) -> Result<Value> {
        if job_def.runtime == JobRuntime::Docker {
            return Err(buildit_core::Error::Internal(
                "docker-runtime job bundles are not yet executable by the job engine".to_string(),
            )
            .into());
        }

        let (descriptor, capabilities, guard) = match job_def.parsed_entry_point() {
            EntryPoint::Bundle { slug, version, export } => {
                let bundle = match self.bundles.get(&slug, &version).await {
                    Ok(bundle) => bundle,
                    Err(buildit_db::DbError::NotFound(_)) => {
                        self.recovery.recover(job_def, &slug, &version).await?
                    }
                    Err(e) => return Err(e.into()),
                };
                let capabilities = Capability::parse_set(&bundle.capability_flags);
                let guard = self.bundle_cache.acquire(&bundle, self.bundle_store.as_ref()).await?;
                let descriptor = bundle_descriptor(&bundle, guard.dir().to_string_lossy().as_ref(), job_def.runtime, export)?;
                (descriptor, capabilities, Some(guard))
            }
            EntryPoint::Inline(path) => {
                let descriptor = SandboxBundleDescriptor {
                    slug: job_def.slug.clone(),
                    version: job_def.version.clone(),
                    checksum: String::new(),
                    directory: String::new(),
                    entry_file: path,
                    manifest: Value::Null,
                    export_name: None,
                };
                (descriptor, Vec::new(), None)
            }
        };
        // Keep the cache guard alive for the duration of the sandbox run.
        let _guard = guard;

        let (command, args) = harness_command(job_def.runtime, &self.config).await?;
        let options = SandboxExecutionOptions {
            runtime: job_def.runtime,
            bundle: descriptor,
            job: SandboxJobDescriptor {
                run_id,
                job_slug: job_def.slug.clone(),
                parameters,
                timeout_ms: job_def.timeout_ms,
                workflow_event_context: context,
            },
            capabilities,
            host_root_prefix: None,
            max_sandbox_logs: self.config.max_sandbox_logs,
        };

        let callbacks = JobEngineCallbacks {
            job_runs: self.job_runs.clone(),
            secrets: self.secrets.clone(),
        };
        let result = self
            .sandbox
            .run(&command, &args, None, &[], options, &callbacks)
            .await
            .map_err(classify_sandbox_error)?;
        Ok(result.result)
    }
}

fn bundle_descriptor(
    bundle: &JobBundleVersion,
    directory: &str,
    runtime: JobRuntime,
    export: Option<String>,
) -> Result<SandboxBundleDescriptor> {
    let manifest: BundleManifest = serde_json::from_value(bundle.manifest.clone())?;
    let entry_file = match runtime {
        JobRuntime::Python => manifest.python_entry.clone().unwrap_or_else(|| manifest.entry.clone()),
        _ => manifest.main.clone().unwrap_or_else(|| manifest.entry.clone()),
    };
    Ok(SandboxBundleDescriptor {
        slug: bundle.slug.clone(),
        version: bundle.version.clone(),
        checksum: bundle.checksum.clone(),
        directory: directory.to_string(),
        entry_file,
        manifest: bundle.manifest.clone(),
        export_name: export,
    })
}

const NODE_HARNESS_SRC: &str = include_str!("../harness/node-harness.js");
const PYTHON_HARNESS_SRC: &str = include_str!("../harness/python_harness.py");

/// Writes an embedded harness script to `path` if it isn't already there, so a fresh
/// deployment works without a separate harness-distribution step.
async fn ensure_harness(path: &str, source: &str) -> Result<()> {
    if tokio::fs::metadata(path).await.is_ok() {
        return Ok(());
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, source).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o755);
        tokio::fs::set_permissions(path, perms).await?;
    }
    Ok(())
}

async fn harness_command(runtime: JobRuntime, config: &SandboxConfig) -> Result<(String, Vec<String>)> {
    match runtime {
        JobRuntime::Node => {
            ensure_harness(&config.node_harness_path, NODE_HARNESS_SRC).await?;
            Ok(("node".to_string(), vec![config.node_harness_path.clone()]))
        }
        JobRuntime::Python => {
            ensure_harness(&config.python_harness_path, PYTHON_HARNESS_SRC).await?;
            Ok(("python3".to_string(), vec![config.python_harness_path.clone()]))
        }
        JobRuntime::Docker => unreachable!("docker runtime is rejected before dispatch"),
    }
}

/// Maps a sandbox-protocol failure onto the job-run error taxonomy, surfacing the
/// child's own `SandboxViolation` error name as [`buildit_core::Error::SandboxViolation`]
/// so a C9 capability breach is reported and classified as such, not as a generic crash.
fn classify_sandbox_error(e: buildit_sandbox::SandboxError) -> buildit_core::Error {
    use buildit_sandbox::SandboxError;
    match e {
        SandboxError::Timeout(d) => buildit_core::Error::SandboxTimeout { elapsed_ms: d.as_millis() as u64 },
        SandboxError::NoResult
        | SandboxError::Protocol(_)
        | SandboxError::Spawn(_)
        | SandboxError::Stdin(_)
        | SandboxError::Stdout(_) => buildit_core::Error::SandboxCrash(e.to_string()),
        SandboxError::JobFailed { message, name, .. } if name.as_deref() == Some("SandboxViolation") => {
            buildit_core::Error::SandboxViolation(message)
        }
        SandboxError::JobFailed { message, .. } => buildit_core::Error::Internal(message),
        SandboxError::Callback(message) => buildit_core::Error::Internal(message),
    }
}

struct JobEngineCallbacks {
    job_runs: Arc<dyn JobRunRepo>,
    secrets: Arc<dyn SecretStore>,
}

#[async_trait]
impl SandboxCallbacks for JobEngineCallbacks {
    async fn apply_update(&self, run_id: ResourceId, partial: Value) -> buildit_sandbox::Result<Value> {
        let updated = self
            .job_runs
            .update_metrics(run_id, partial)
            .await
            .map_err(|e| buildit_sandbox::SandboxError::Callback(e.to_string()))?;
        serde_json::to_value(&updated).map_err(|e| buildit_sandbox::SandboxError::Callback(e.to_string()))
    }

    async fn resolve_secret(&self, reference: &str) -> buildit_sandbox::Result<Value> {
        let path = reference.strip_prefix("secret:").unwrap_or(reference);
        let value = self
            .secrets
            .get(path)
            .await
            .map_err(|e| buildit_sandbox::SandboxError::Callback(e.to_string()))?;
        serde_json::to_value(&value).map_err(|e| buildit_sandbox::SandboxError::Callback(e.to_string()))
    }
}

#[async_trait]
impl PipelineConsumer for JobEngineConsumer {
    fn queue_name(&self) -> QueueName {
        QueueName::JobRun
    }

    async fn handle(&self, payload: Value) -> Result<()> {
        let message: JobRunMessage = serde_json::from_value(payload)?;
        let run_id: ResourceId = message
            .job_run_id
            .parse()
            .map_err(|_| buildit_core::Error::Validation(format!("invalid job run id: {}", message.job_run_id)))?;
        self.run(run_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_command_picks_interpreter_and_materializes_script() {
        let dir = tempfile::tempdir().unwrap();
        let node_path = dir.path().join("node-harness.js");
        let python_path = dir.path().join("python_harness.py");
        let config = SandboxConfig {
            max_sandbox_logs: 200,
            bundle_cache_dir: "/tmp".to_string(),
            node_harness_path: node_path.to_string_lossy().to_string(),
            python_harness_path: python_path.to_string_lossy().to_string(),
        };

        let (cmd, args) = harness_command(JobRuntime::Node, &config).await.unwrap();
        assert_eq!(cmd, "node");
        assert_eq!(args, vec![node_path.to_string_lossy().to_string()]);
        assert!(tokio::fs::metadata(&node_path).await.is_ok());

        let (cmd, args) = harness_command(JobRuntime::Python, &config).await.unwrap();
        assert_eq!(cmd, "python3");
        assert_eq!(args, vec![python_path.to_string_lossy().to_string()]);
        assert!(tokio::fs::metadata(&python_path).await.is_ok());
    }

    #[test]
    fn classifies_sandbox_errors() {
        use buildit_sandbox::SandboxError;

        assert!(matches!(
            classify_sandbox_error(SandboxError::Timeout(std::time::Duration::from_secs(1))),
            buildit_core::Error::SandboxTimeout { .. }
        ));
        assert!(matches!(
            classify_sandbox_error(SandboxError::NoResult),
            buildit_core::Error::SandboxCrash(_)
        ));
        assert!(matches!(
            classify_sandbox_error(SandboxError::JobFailed {
                message: "fs denied".to_string(),
                name: Some("SandboxViolation".to_string()),
                stack: None,
            }),
            buildit_core::Error::SandboxViolation(_)
        ));
        assert!(matches!(
            classify_sandbox_error(SandboxError::JobFailed {
                message: "boom".to_string(),
                name: None,
                stack: None,
            }),
            buildit_core::Error::Internal(_)
        ));
    }
}
