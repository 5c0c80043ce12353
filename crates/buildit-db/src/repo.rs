//! Repository traits and PostgreSQL implementations, one module per entity.

pub mod build;
pub mod job;
pub mod job_run;
pub mod launch;
pub mod repository;
pub mod service;

pub use build::{BuildRepo, BuildRow, PgBuildRepo};
pub use job::{
    JobBundleRepo, JobBundleVersionRow, JobDefinitionRepo, JobDefinitionRow, PgJobBundleRepo,
    PgJobDefinitionRepo,
};
pub use job_run::{JobRunRepo, JobRunRow, PgJobRunRepo};
pub use launch::{
    LaunchRepo, LaunchRow, PgLaunchRepo, PgServiceNetworkRepo, ServiceNetworkRepo,
};
pub use repository::{PgRepositoryRepo, RepositoryRepo, RepositoryRow};
pub use service::{PgServiceRepo, ServiceRepo, ServiceRow};
