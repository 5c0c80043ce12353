//! Sandboxed job-bundle execution (C9).
//!
//! A [`Sandbox`] spawns the runtime-appropriate child process (node/python harness
//! or a docker run invocation), hands it a `start` message describing the bundle
//! and job parameters, and relays the child's `update`/`resolve_secret` RPCs to the
//! job engine (C10) via [`SandboxCallbacks`] while capturing logs up to a cap.

pub mod error;
pub mod process;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use buildit_core::ResourceId;
use buildit_core::sandbox::{
    ResourceUsage, SandboxExecutionOptions, SandboxLogEntry, SandboxMessage, SandboxResult,
};

pub use error::{Result, SandboxError};
pub use process::SandboxProcess;

/// Callbacks the job engine supplies for the duration of one sandbox run.
#[async_trait]
pub trait SandboxCallbacks: Send + Sync {
    /// Apply a partial `JobRun` update requested by the running job; returns the
    /// refreshed run as JSON for the child to see.
    async fn apply_update(&self, run_id: ResourceId, partial: Value) -> Result<Value>;

    /// Resolve a secret reference (e.g. `secret:my-job/api-key`) for the running job.
    async fn resolve_secret(&self, reference: &str) -> Result<Value>;
}

pub struct Sandbox {
    grace_period: Duration,
}

impl Sandbox {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    /// Run one job to completion (or timeout) inside a freshly spawned child process.
    pub async fn run(
        &self,
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: &[(String, String)],
        options: SandboxExecutionOptions,
        callbacks: &dyn SandboxCallbacks,
    ) -> Result<SandboxResult> {
        let run_id = options.job.run_id;
        let timeout = Duration::from_millis(options.job.timeout_ms);
        let max_logs = options.max_sandbox_logs;

        let mut process = SandboxProcess::spawn(command, args, cwd, env).await?;
        process
            .send(&SandboxMessage::Start {
                bundle: options.bundle,
                job: options.job,
                capabilities: options.capabilities,
                host_root_prefix: options.host_root_prefix,
            })
            .await?;

        let outcome = tokio::time::timeout(timeout, drive(&mut process, run_id, max_logs, callbacks)).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(run_id = %run_id, timeout_ms = options.job.timeout_ms, "sandbox run timed out");
                process.terminate(self.grace_period).await;
                Err(SandboxError::Timeout(timeout))
            }
        }
    }
}

/// The message-relay loop, run under the caller's timeout.
async fn drive(
    process: &mut SandboxProcess,
    run_id: ResourceId,
    max_logs: usize,
    callbacks: &dyn SandboxCallbacks,
) -> Result<SandboxResult> {
    let started = Instant::now();
    let mut logs = Vec::new();
    let mut truncated = 0usize;

    loop {
        let Some(message) = process.recv().await? else {
            return Err(SandboxError::NoResult);
        };

        match message {
            SandboxMessage::Log { level, message, meta } => {
                if logs.len() < max_logs {
                    logs.push(SandboxLogEntry { level, message, meta });
                } else {
                    truncated += 1;
                }
            }
            SandboxMessage::UpdateRequest { request_id, partial } => {
                let response = match callbacks.apply_update(run_id, partial).await {
                    Ok(value) => SandboxMessage::Response { request_id, ok: true, value },
                    Err(e) => SandboxMessage::Response {
                        request_id,
                        ok: false,
                        value: Value::String(e.to_string()),
                    },
                };
                process.send(&response).await?;
            }
            SandboxMessage::ResolveSecretRequest { request_id, reference } => {
                let response = match callbacks.resolve_secret(&reference).await {
                    Ok(value) => SandboxMessage::Response { request_id, ok: true, value },
                    Err(e) => SandboxMessage::Response {
                        request_id,
                        ok: false,
                        value: Value::String(e.to_string()),
                    },
                };
                process.send(&response).await?;
            }
            SandboxMessage::Result { result, duration_ms, resource_usage } => {
                info!(run_id = %run_id, duration_ms, "sandbox job completed");
                return Ok(build_result(run_id, result, duration_ms, resource_usage, logs, truncated));
            }
            SandboxMessage::Error { message, name, stack, .. } => {
                return Err(SandboxError::JobFailed { message, name, stack });
            }
            SandboxMessage::Start { .. } | SandboxMessage::Response { .. } => {
                return Err(SandboxError::Protocol(format!(
                    "unexpected message from sandbox child after {:?}",
                    started.elapsed()
                )));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildit_core::ResourceId;
    use buildit_core::sandbox::{SandboxBundleDescriptor, SandboxJobDescriptor};
    use serde_json::json;

    struct NoCallbacks;

    #[async_trait]
    impl SandboxCallbacks for NoCallbacks {
        async fn apply_update(&self, _run_id: ResourceId, _partial: Value) -> Result<Value> {
            Err(SandboxError::Callback("unexpected update request".into()))
        }
        async fn resolve_secret(&self, _reference: &str) -> Result<Value> {
            Err(SandboxError::Callback("unexpected secret request".into()))
        }
    }

    fn options(timeout_ms: u64) -> SandboxExecutionOptions {
        SandboxExecutionOptions {
            runtime: buildit_core::job::JobRuntime::Node,
            bundle: SandboxBundleDescriptor {
                slug: "demo".into(),
                version: "1.0.0".into(),
                checksum: "deadbeef".into(),
                directory: "/tmp/demo".into(),
                entry_file: "index.js".into(),
                manifest: json!({}),
                export_name: None,
            },
            job: SandboxJobDescriptor {
                run_id: ResourceId::new(),
                job_slug: "demo".into(),
                parameters: json!({}),
                timeout_ms,
                workflow_event_context: None,
            },
            capabilities: vec![],
            host_root_prefix: None,
            max_sandbox_logs: 10,
        }
    }

    #[tokio::test]
    async fn runs_to_completion() {
        let script = "read _line; printf '{\"type\":\"result\",\"result\":{\"ok\":true},\"duration_ms\":3,\"resource_usage\":null}\\n'";
        let sandbox = Sandbox::new(Duration::from_millis(500));
        let result = sandbox
            .run(
                "sh",
                &["-c".to_string(), script.to_string()],
                None,
                &[],
                options(5_000),
                &NoCallbacks,
            )
            .await
            .unwrap();
        assert_eq!(result.result, json!({"ok": true}));
        assert_eq!(result.truncated_log_count, 0);
    }

    #[tokio::test]
    async fn propagates_child_error() {
        let script = "read _line; printf '{\"type\":\"error\",\"message\":\"boom\",\"stack\":null,\"name\":null,\"properties\":null}\\n'";
        let sandbox = Sandbox::new(Duration::from_millis(500));
        let err = sandbox
            .run(
                "sh",
                &["-c".to_string(), script.to_string()],
                None,
                &[],
                options(5_000),
                &NoCallbacks,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::JobFailed { .. }));
    }

    #[tokio::test]
    async fn times_out_a_hanging_child() {
        let script = "read _line; sleep 5";
        let sandbox = Sandbox::new(Duration::from_millis(50));
        let err = sandbox
            .run(
                "sh",
                &["-c".to_string(), script.to_string()],
                None,
                &[],
                options(100),
                &NoCallbacks,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout(_)));
    }

    #[tokio::test]
    async fn caps_logs_and_counts_truncation() {
        let script = "read _line; for i in 1 2 3 4 5; do printf '{\"type\":\"log\",\"level\":\"info\",\"message\":\"m\",\"meta\":null}\\n'; done; printf '{\"type\":\"result\",\"result\":null,\"duration_ms\":1,\"resource_usage\":null}\\n'";
        let sandbox = Sandbox::new(Duration::from_millis(500));
        let mut opts = options(5_000);
        opts.max_sandbox_logs = 2;
        let result = sandbox
            .run("sh", &["-c".to_string(), script.to_string()], None, &[], opts, &NoCallbacks)
            .await
            .unwrap();
        assert_eq!(result.logs.len(), 2);
        assert_eq!(result.truncated_log_count, 3);
    }
}

fn build_result(
    task_id: ResourceId,
    result: Value,
    duration_ms: u64,
    resource_usage: Option<ResourceUsage>,
    logs: Vec<SandboxLogEntry>,
    truncated_log_count: usize,
) -> SandboxResult {
    SandboxResult {
        task_id,
        result,
        duration_ms,
        resource_usage,
        logs,
        truncated_log_count,
    }
}
