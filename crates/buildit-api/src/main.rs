//! BuildIt API server: HTTP control plane plus the background poll-loop workers
//! for every queue (C2/C6-C10).

use std::sync::Arc;

use buildit_api::{AppState, routes};
use buildit_config::SystemConfig;
use buildit_config::system::ExecutorBackend;
use buildit_core::executor::Executor;
use buildit_core::secret::EnvSecretStore;
use buildit_db::create_pool;
use buildit_executor::{KubernetesExecutor, LocalDockerExecutor};
use buildit_scheduler::{
    BuildConsumer, IngestionConsumer, JobEngineConsumer, LaunchStartConsumer,
    LaunchStopConsumer, QueueName, register_inline, run_poll_loop,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = SystemConfig::from_env()?;

    info!("connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    buildit_db::run_migrations(&pool).await?;
    info!("database connected");

    let state = AppState::new(pool.clone(), config.clone()).await?;

    let executor: Arc<dyn Executor> = match &config.executor {
        ExecutorBackend::Docker => Arc::new(LocalDockerExecutor::new()?),
        ExecutorBackend::Kubernetes { namespace } => {
            Arc::new(KubernetesExecutor::new(namespace.clone()).await?)
        }
    };
    let secrets = Arc::new(EnvSecretStore::new());

    let ingestion = Arc::new(IngestionConsumer::new(
        state.repositories.clone(),
        state.builds.clone(),
        state.queue.clone(),
        state.events.clone(),
        std::env::temp_dir().join("buildit-ingest"),
    ));
    let build_consumer = Arc::new(BuildConsumer::new(
        state.builds.clone(),
        state.repositories.clone(),
        executor.clone(),
        state.events.clone(),
    ));
    let launch_start = Arc::new(LaunchStartConsumer::new(state.launch_service.clone()));
    let launch_stop = Arc::new(LaunchStopConsumer::new(state.launch_service.clone()));
    let job_engine = Arc::new(JobEngineConsumer::new(
        state.job_runs.clone(),
        state.job_defs.clone(),
        state.job_bundles.clone(),
        state.bundle_store.clone(),
        state.bundle_cache.clone(),
        state.bundle_recovery.clone(),
        secrets,
        state.sandbox.clone(),
        state.queue.clone(),
        state.events.clone(),
        config.sandbox.clone(),
    ));

    match &config.queue.mode {
        buildit_config::system::QueueMode::Inline => {
            let inline = state
                .inline_queue
                .as_ref()
                .expect("inline_queue is set when QueueMode::Inline");
            register_inline(inline, ingestion).await;
            register_inline(inline, build_consumer).await;
            register_inline(inline, launch_start).await;
            register_inline(inline, launch_stop).await;
            register_inline(inline, job_engine).await;
        }
        buildit_config::system::QueueMode::Broker => {
            spawn_workers(state.queue.clone(), QueueName::Ingest, ingestion, config.queue.workers_per_queue);
            spawn_workers(state.queue.clone(), QueueName::Build, build_consumer, config.queue.workers_per_queue);
            spawn_workers(state.queue.clone(), QueueName::LaunchStart, launch_start, config.queue.workers_per_queue);
            spawn_workers(state.queue.clone(), QueueName::LaunchStop, launch_stop, config.queue.workers_per_queue);
            spawn_workers(state.queue.clone(), QueueName::JobRun, job_engine, config.queue.job_run_concurrency);
        }
    }

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any));

    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_workers(
    queue: Arc<dyn buildit_scheduler::Queue>,
    name: QueueName,
    consumer: Arc<dyn buildit_scheduler::PipelineConsumer>,
    count: u32,
) {
    for worker in 0..count.max(1) {
        let queue = queue.clone();
        let consumer = consumer.clone();
        let worker_id = format!("{}-{worker}", name.as_str());
        tokio::spawn(run_poll_loop(queue, worker_id, consumer));
    }
}
