//! Shared sandbox-execution types (C9): the request/response shapes that cross the
//! parent/child process boundary, plus the options the job engine (C10) builds per run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ResourceId;
use crate::bundle::Capability;
use crate::job::JobRuntime;

/// Descriptor of a bundle on local disk, handed to the sandbox child in the `start` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxBundleDescriptor {
    pub slug: String,
    pub version: String,
    pub checksum: String,
    pub directory: String,
    pub entry_file: String,
    pub manifest: Value,
    pub export_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxJobDescriptor {
    pub run_id: ResourceId,
    pub job_slug: String,
    pub parameters: Value,
    pub timeout_ms: u64,
    pub workflow_event_context: Option<Value>,
}

/// Everything the job engine assembles before invoking the sandbox for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxExecutionOptions {
    pub runtime: JobRuntime,
    pub bundle: SandboxBundleDescriptor,
    pub job: SandboxJobDescriptor,
    pub capabilities: Vec<Capability>,
    /// Optional host-root prefix used to rebase absolute FS paths when `fs` is granted.
    pub host_root_prefix: Option<String>,
    pub max_sandbox_logs: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxLogEntry {
    pub level: LogLevel,
    pub message: String,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub max_rss_kb: Option<u64>,
    pub user_cpu_ms: Option<u64>,
    pub system_cpu_ms: Option<u64>,
}

/// Child-to-parent and parent-to-child RPC frames exchanged over the sandbox's line-delimited
/// JSON channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SandboxMessage {
    Start {
        bundle: SandboxBundleDescriptor,
        job: SandboxJobDescriptor,
        capabilities: Vec<Capability>,
        host_root_prefix: Option<String>,
    },
    /// Child -> parent: request to apply a partial JobRun update and receive the refreshed run.
    UpdateRequest {
        request_id: String,
        partial: Value,
    },
    /// Child -> parent: request to resolve a secret reference.
    ResolveSecretRequest {
        request_id: String,
        reference: String,
    },
    /// Parent -> child: response to either request above.
    Response {
        request_id: String,
        ok: bool,
        value: Value,
    },
    Log {
        level: LogLevel,
        message: String,
        meta: Option<Value>,
    },
    Result {
        result: Value,
        duration_ms: u64,
        resource_usage: Option<ResourceUsage>,
    },
    Error {
        message: String,
        stack: Option<String>,
        name: Option<String>,
        properties: Option<Value>,
    },
}

/// Outcome of one sandbox invocation, returned to the job engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxResult {
    pub task_id: ResourceId,
    pub result: Value,
    pub duration_ms: u64,
    pub resource_usage: Option<ResourceUsage>,
    pub logs: Vec<SandboxLogEntry>,
    pub truncated_log_count: usize,
}

/// Default cap on in-memory retained sandbox log entries per run.
pub const DEFAULT_MAX_SANDBOX_LOGS: usize = 200;
