//! Job scheduling for BuildIt CI/CD.
//!
//! Polls the named durable queues (ingest, build, launch-start, launch-stop,
//! job-run) and drives each through its pipeline. Uses PostgreSQL with
//! SKIP LOCKED for distributed claiming, or an in-process queue for
//! single-binary deployments.

pub mod build;
pub mod bundle_cache;
pub mod bundle_recovery;
pub mod error;
pub mod ingestion;
pub mod job_engine;
pub mod launch;
pub mod poller;
pub mod queue;

pub use error::{Result, SchedulerError};
pub use poller::{run_poll_loop, register_inline, PipelineConsumer};
pub use queue::{EnqueueOptions, InlineQueue, PgQueue, Queue, QueueMessage, QueueName};

pub use build::BuildConsumer;
pub use bundle_cache::{BundleCache, BundleGuard};
pub use bundle_recovery::BundleRecovery;
pub use ingestion::IngestionConsumer;
pub use job_engine::JobEngineConsumer;
pub use launch::{LaunchService, LaunchStartConsumer, LaunchStopConsumer};
