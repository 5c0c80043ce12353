//! System-wide configuration, loaded once at process start from the environment.

use std::time::Duration;

use crate::{ConfigError, ConfigResult};

/// Where job-bundle artifacts live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Local { root: String },
    S3(S3Config),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Config {
    pub bucket: String,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub prefix: Option<String>,
}

/// Whether queued work is dispatched to an external broker or run in-process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    Inline,
    Broker,
}

/// Which backend runs build/launch containers (C7/C8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorBackend {
    Docker,
    Kubernetes { namespace: String },
}

#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub max_sandbox_logs: usize,
    pub bundle_cache_dir: String,
    /// Path to the harness binary the job engine spawns for `JobRuntime::Node` bundles.
    pub node_harness_path: String,
    /// Path to the harness binary the job engine spawns for `JobRuntime::Python` bundles.
    pub python_harness_path: String,
}

#[derive(Debug, Clone)]
pub struct PreviewConfig {
    pub base_url: Option<String>,
    pub token_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub mode: QueueMode,
    pub workers_per_queue: u32,
    pub job_run_concurrency: u32,
}

#[derive(Debug, Clone)]
pub struct SystemConfig {
    pub database_url: String,
    pub storage: StorageBackend,
    pub signing_secret: String,
    pub sandbox: SandboxConfig,
    pub preview: PreviewConfig,
    pub queue: QueueConfig,
    pub executor: ExecutorBackend,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn require_env(name: &str) -> ConfigResult<String> {
    env_var(name).ok_or_else(|| ConfigError::MissingField(name.to_string()))
}

impl SystemConfig {
    /// Load configuration from the process environment. CLI flags, where present,
    /// are applied on top of this by the binary entry points.
    pub fn from_env() -> ConfigResult<Self> {
        let database_url = require_env("DATABASE_URL")?;
        let signing_secret = require_env("BUILDIT_SIGNING_SECRET")?;

        let storage = match env_var("BUILDIT_STORAGE_BACKEND").as_deref() {
            None | Some("local") => StorageBackend::Local {
                root: env_var("BUILDIT_BUNDLE_CACHE_DIR")
                    .unwrap_or_else(|| "/var/lib/buildit/bundles".to_string()),
            },
            Some("s3") => StorageBackend::S3(S3Config {
                bucket: require_env("BUILDIT_S3_BUCKET")?,
                region: env_var("BUILDIT_S3_REGION"),
                endpoint: env_var("BUILDIT_S3_ENDPOINT"),
                prefix: env_var("BUILDIT_S3_PREFIX"),
            }),
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "BUILDIT_STORAGE_BACKEND".to_string(),
                    message: format!("unknown storage backend '{other}'"),
                });
            }
        };

        let queue_mode = match env_var("BUILDIT_QUEUE_MODE").as_deref() {
            None | Some("inline") => QueueMode::Inline,
            Some("broker") => QueueMode::Broker,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "BUILDIT_QUEUE_MODE".to_string(),
                    message: format!("unknown queue mode '{other}'"),
                });
            }
        };

        let executor = match env_var("BUILDIT_EXECUTOR_BACKEND").as_deref() {
            None | Some("docker") => ExecutorBackend::Docker,
            Some("kubernetes") => ExecutorBackend::Kubernetes {
                namespace: env_var("BUILDIT_K8S_NAMESPACE").unwrap_or_else(|| "default".to_string()),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    field: "BUILDIT_EXECUTOR_BACKEND".to_string(),
                    message: format!("unknown executor backend '{other}'"),
                });
            }
        };

        Ok(Self {
            database_url,
            storage,
            signing_secret,
            sandbox: SandboxConfig {
                max_sandbox_logs: env_var("BUILDIT_SANDBOX_MAX_LOGS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(200),
                bundle_cache_dir: env_var("BUILDIT_BUNDLE_CACHE_DIR")
                    .unwrap_or_else(|| "/var/lib/buildit/bundle-cache".to_string()),
                node_harness_path: env_var("BUILDIT_NODE_HARNESS_PATH")
                    .unwrap_or_else(|| "/usr/local/libexec/buildit/node-harness.js".to_string()),
                python_harness_path: env_var("BUILDIT_PYTHON_HARNESS_PATH")
                    .unwrap_or_else(|| "/usr/local/libexec/buildit/python_harness.py".to_string()),
            },
            preview: PreviewConfig {
                base_url: env_var("BUILDIT_PREVIEW_BASE_URL"),
                token_secret: env_var("BUILDIT_PREVIEW_TOKEN_SECRET"),
            },
            queue: QueueConfig {
                mode: queue_mode,
                workers_per_queue: env_var("BUILDIT_WORKERS_PER_QUEUE")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2),
                job_run_concurrency: env_var("BUILDIT_JOB_RUN_CONCURRENCY")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(4),
            },
            executor,
        })
    }

    pub fn sandbox_timeout_default(&self) -> Duration {
        Duration::from_secs(300)
    }
}
