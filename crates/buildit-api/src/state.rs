//! Application state: `Arc`-wrapped repositories, the queue handle, the event
//! broadcaster, and the bundle store/sandbox config shared by every route handler
//! and (in `main.rs`) by the background poll loops.

use std::sync::Arc;

use sqlx::PgPool;

use buildit_config::SystemConfig;
use buildit_config::system::ExecutorBackend;
use buildit_core::events::EventBus;
use buildit_core::executor::Executor;
use buildit_db::{
    BuildRepo, JobBundleRepo, JobDefinitionRepo, JobRunRepo, LaunchRepo, PgBuildRepo,
    PgJobBundleRepo, PgJobDefinitionRepo, PgJobRunRepo, PgLaunchRepo, PgRepositoryRepo,
    PgServiceNetworkRepo, PgServiceRepo, RepositoryRepo, ServiceNetworkRepo, ServiceRepo,
};
use buildit_executor::{KubernetesExecutor, LocalDockerExecutor};
use buildit_sandbox::Sandbox;
use buildit_scheduler::bundle_cache::BundleCache;
use buildit_scheduler::bundle_recovery::BundleRecovery;
use buildit_scheduler::{InlineQueue, LaunchService, PgQueue, Queue};

use crate::auth::AuthConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub repositories: Arc<dyn RepositoryRepo>,
    pub builds: Arc<dyn BuildRepo>,
    pub launches: Arc<dyn LaunchRepo>,
    pub services: Arc<dyn ServiceRepo>,
    pub service_networks: Arc<dyn ServiceNetworkRepo>,
    pub job_defs: Arc<dyn JobDefinitionRepo>,
    pub job_bundles: Arc<dyn JobBundleRepo>,
    pub job_runs: Arc<dyn JobRunRepo>,
    pub queue: Arc<dyn Queue>,
    pub events: Arc<EventBus>,
    pub bundle_store: Arc<dyn buildit_bundle_store::BundleStore>,
    pub bundle_cache: Arc<BundleCache>,
    pub bundle_recovery: Arc<BundleRecovery>,
    pub sandbox: Arc<Sandbox>,
    pub launch_service: Arc<LaunchService>,
    /// Set alongside `queue` in `QueueMode::Inline` so callers that need to register
    /// consumers (`main.rs`) register against the exact instance `queue` enqueues onto.
    pub inline_queue: Option<Arc<InlineQueue>>,
    pub config: Arc<SystemConfig>,
    pub auth: Arc<AuthConfig>,
}

impl AppState {
    pub async fn new(pool: PgPool, config: SystemConfig) -> anyhow::Result<Self> {
        let repositories: Arc<dyn RepositoryRepo> = Arc::new(PgRepositoryRepo::new(pool.clone()));
        let builds: Arc<dyn BuildRepo> = Arc::new(PgBuildRepo::new(pool.clone()));
        let launches: Arc<dyn LaunchRepo> = Arc::new(PgLaunchRepo::new(pool.clone()));
        let services: Arc<dyn ServiceRepo> = Arc::new(PgServiceRepo::new(pool.clone()));
        let service_networks: Arc<dyn ServiceNetworkRepo> =
            Arc::new(PgServiceNetworkRepo::new(pool.clone()));
        let job_defs: Arc<dyn JobDefinitionRepo> = Arc::new(PgJobDefinitionRepo::new(pool.clone()));
        let job_bundles: Arc<dyn JobBundleRepo> = Arc::new(PgJobBundleRepo::new(pool.clone()));
        let job_runs: Arc<dyn JobRunRepo> = Arc::new(PgJobRunRepo::new(pool.clone()));

        let inline_queue: Option<Arc<InlineQueue>> = match config.queue.mode {
            buildit_config::system::QueueMode::Inline => Some(Arc::new(InlineQueue::new())),
            buildit_config::system::QueueMode::Broker => None,
        };
        let queue: Arc<dyn Queue> = match &inline_queue {
            Some(inline) => inline.clone() as Arc<dyn Queue>,
            None => Arc::new(PgQueue::new(pool.clone())),
        };

        let events = Arc::new(EventBus::default());
        let bundle_store = buildit_bundle_store::from_system_config(&config).await;
        let bundle_cache = Arc::new(BundleCache::new(
            config.sandbox.bundle_cache_dir.clone(),
            std::time::Duration::from_secs(3600),
        ));
        let bundle_recovery = Arc::new(BundleRecovery::new(
            job_defs.clone(),
            job_bundles.clone(),
            bundle_store.clone(),
            true,
        ));
        let sandbox = Arc::new(Sandbox::new(std::time::Duration::from_secs(5)));

        let executor: Arc<dyn Executor> = match &config.executor {
            ExecutorBackend::Docker => Arc::new(LocalDockerExecutor::new()?),
            ExecutorBackend::Kubernetes { namespace } => {
                Arc::new(KubernetesExecutor::new(namespace.clone()).await?)
            }
        };
        let launch_service = Arc::new(LaunchService::new(
            launches.clone(),
            builds.clone(),
            repositories.clone(),
            services.clone(),
            service_networks.clone(),
            executor,
            events.clone(),
            config.preview.clone(),
            queue.clone(),
        ));

        Ok(Self {
            pool,
            repositories,
            builds,
            launches,
            services,
            service_networks,
            job_defs,
            job_bundles,
            job_runs,
            queue,
            events,
            bundle_store,
            bundle_cache,
            bundle_recovery,
            sandbox,
            launch_service,
            inline_queue,
            config: Arc::new(config),
            auth: Arc::new(AuthConfig::from_env()),
        })
    }
}
