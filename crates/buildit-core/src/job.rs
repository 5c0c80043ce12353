//! JobDefinition: a named callable unit of work, plus its retry policy and entry-point
//! reference into the bundle store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobRuntime {
    Node,
    Python,
    Docker,
}

/// A parsed `entry_point` reference: either a bundle reference or an inline path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPoint {
    Bundle {
        slug: String,
        version: String,
        export: Option<String>,
    },
    Inline(String),
}

impl EntryPoint {
    /// Parse `bundle:<slug>@<version>[#<export>]`, falling back to an inline path otherwise.
    pub fn parse(raw: &str) -> Self {
        let Some(rest) = raw.strip_prefix("bundle:") else {
            return EntryPoint::Inline(raw.to_string());
        };
        let (head, export) = match rest.split_once('#') {
            Some((h, e)) => (h, Some(e.to_string())),
            None => (rest, None),
        };
        match head.split_once('@') {
            Some((slug, version)) => EntryPoint::Bundle {
                slug: slug.to_string(),
                version: version.to_string(),
                export,
            },
            None => EntryPoint::Inline(raw.to_string()),
        }
    }

    pub fn to_raw(&self) -> String {
        match self {
            EntryPoint::Bundle {
                slug,
                version,
                export,
            } => match export {
                Some(export) => format!("bundle:{slug}@{version}#{export}"),
                None => format!("bundle:{slug}@{version}"),
            },
            EntryPoint::Inline(path) => path.clone(),
        }
    }
}

/// Backoff shape evaluated by the job engine on each job-run failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub backoff: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt should be made given the attempt number that just failed.
    pub fn should_retry(&self, failed_attempt: u32) -> bool {
        failed_attempt < self.max_attempts
    }

    /// Delay before the next attempt, given the attempt number that just failed (1-based).
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> std::time::Duration {
        let ms = match self.backoff {
            BackoffStrategy::Fixed => self.initial_delay_ms,
            BackoffStrategy::Exponential => {
                self.initial_delay_ms.saturating_mul(1u64 << failed_attempt.min(16))
            }
        };
        std::time::Duration::from_millis(ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    pub slug: String,
    pub name: String,
    pub job_type: String,
    pub version: String,
    pub runtime: JobRuntime,
    pub entry_point: String,
    pub timeout_ms: u64,
    pub retry_policy: RetryPolicy,
    pub parameters_schema: Option<Value>,
    pub default_parameters: Value,
    /// May embed an AI-builder suggestion consulted by bundle recovery (C5).
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobDefinition {
    pub fn parsed_entry_point(&self) -> EntryPoint {
        EntryPoint::parse(&self.entry_point)
    }
}

/// Bump `major.minor.patch` -> `major.minor.(patch+1)`. Returns `None` (fallback suffix case)
/// if `version` does not parse as strict `X.Y.Z`.
pub fn bump_patch(version: &str) -> Option<String> {
    let mut parts = version.splitn(3, '.');
    let major = parts.next()?;
    let minor = parts.next()?;
    let patch = parts.next()?;
    if patch.contains(|c: char| !c.is_ascii_digit()) {
        return None;
    }
    let patch: u64 = patch.parse().ok()?;
    Some(format!("{major}.{minor}.{}", patch + 1))
}

/// Result of `bump_patch`/`regen_suffix`, used by recovery when strict semver parsing fails.
pub fn regen_suffix_version(version: &str, epoch_ms: u64) -> String {
    format!("{version}+regen-{epoch_ms}")
}

pub fn validate_slug(slug: &str) -> Result<(), Error> {
    if slug.is_empty() || !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(Error::Validation(format!("invalid job slug: {slug}")));
    }
    Ok(())
}
