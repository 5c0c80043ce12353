//! Launch pipeline (C8): start and stop preview instances of a built image.
//!
//! Two queues feed this module (`launch-start`, `launch-stop`); both share the
//! env-resolution and service-network bookkeeping below through `LaunchService`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

use buildit_config::system::PreviewConfig;
use buildit_core::build::BuildStatus;
use buildit_core::events::{ChangeEvent, EventBus, EventKind};
use buildit_core::executor::{Executor, JobHandle, JobSpec, ResourceRequirements};
use buildit_core::launch::{EnvVar, Launch, LaunchStatus, ServiceAttribute, ServiceRef};
use buildit_core::ResourceId;
use buildit_db::{BuildRepo, LaunchRepo, RepositoryRepo, ServiceNetworkRepo, ServiceRepo};

use crate::error::{Result, SchedulerError};
use crate::poller::PipelineConsumer;
use crate::queue::{EnqueueOptions, Queue, QueueName};

/// Polling cadence while a network launch sequence waits on a dependency's build or status.
const NETWORK_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Bound on how long a network launch sequence waits on any single dependency before failing.
const NETWORK_POLL_ATTEMPTS: u32 = 150;

#[derive(Debug, Deserialize)]
struct LaunchStartMessage {
    launch_id: String,
    /// Set when this launch is a member of a service network being brought up together.
    network_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LaunchStopMessage {
    launch_id: String,
}

/// Shared logic for starting and stopping launches. Split into two thin
/// `PipelineConsumer`s below since each is keyed off a different queue.
pub struct LaunchService {
    launches: Arc<dyn LaunchRepo>,
    builds: Arc<dyn BuildRepo>,
    repos: Arc<dyn RepositoryRepo>,
    services: Arc<dyn ServiceRepo>,
    networks: Arc<dyn ServiceNetworkRepo>,
    executor: Arc<dyn Executor>,
    events: Arc<EventBus>,
    preview: PreviewConfig,
    queue: Arc<dyn Queue>,
}

impl LaunchService {
    pub fn new(
        launches: Arc<dyn LaunchRepo>,
        builds: Arc<dyn BuildRepo>,
        repos: Arc<dyn RepositoryRepo>,
        services: Arc<dyn ServiceRepo>,
        networks: Arc<dyn ServiceNetworkRepo>,
        executor: Arc<dyn Executor>,
        events: Arc<EventBus>,
        preview: PreviewConfig,
        queue: Arc<dyn Queue>,
    ) -> Self {
        Self {
            launches,
            builds,
            repos,
            services,
            networks,
            executor,
            events,
            preview,
            queue,
        }
    }

    /// Creates a service network's member launches and starts them in `launch_order`
    /// ascending, gating each on its `depends_on` peers reaching `Running` and (when
    /// `wait_for_build` is set) on a succeeded build appearing for its repository.
    /// Each member's `LaunchStart` is enqueued with `network_id` set so
    /// `ServiceNetworkRepo::record_launch_member` links it back to the network.
    pub async fn start_network(&self, network_id: ResourceId) -> Result<Vec<ResourceId>> {
        let members = self.networks.list_members(network_id).await?;
        let mut launch_by_repo: HashMap<String, ResourceId> = HashMap::new();
        let mut started = Vec::with_capacity(members.len());

        for member in members {
            for dep in &member.depends_on {
                if let Some(&dep_launch_id) = launch_by_repo.get(dep) {
                    self.await_launch_running(dep_launch_id).await?;
                }
            }

            let build_id = self.resolve_member_build(&member).await?;
            let launch = self
                .launches
                .create(&member.repository_id, build_id, &member.env, None, None)
                .await?;
            self.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &launch));

            self.queue
                .enqueue(
                    QueueName::LaunchStart,
                    serde_json::json!({
                        "launch_id": launch.id.to_string(),
                        "network_id": network_id.to_string(),
                    }),
                    EnqueueOptions::default(),
                )
                .await?;

            launch_by_repo.insert(member.repository_id.clone(), launch.id);
            started.push(launch.id);
        }

        Ok(started)
    }

    async fn resolve_member_build(&self, member: &buildit_core::launch::NetworkMember) -> Result<ResourceId> {
        if !member.wait_for_build {
            return self
                .builds
                .latest_succeeded(&member.repository_id)
                .await?
                .map(|b| b.id)
                .ok_or_else(|| {
                    buildit_core::Error::DependencyFailed(format!(
                        "no succeeded build for {}",
                        member.repository_id
                    ))
                    .into()
                });
        }

        for _ in 0..NETWORK_POLL_ATTEMPTS {
            if let Some(build) = self.builds.latest_succeeded(&member.repository_id).await? {
                return Ok(build.id);
            }
            tokio::time::sleep(NETWORK_POLL_INTERVAL).await;
        }
        Err(buildit_core::Error::DependencyFailed(format!(
            "timed out waiting for a succeeded build for {}",
            member.repository_id
        ))
        .into())
    }

    async fn await_launch_running(&self, launch_id: ResourceId) -> Result<()> {
        for _ in 0..NETWORK_POLL_ATTEMPTS {
            let launch = self.launches.get_by_id(launch_id).await?;
            match launch.status {
                LaunchStatus::Running => return Ok(()),
                LaunchStatus::Failed => {
                    return Err(buildit_core::Error::DependencyFailed(format!(
                        "dependency launch {launch_id} failed to start"
                    ))
                    .into());
                }
                _ => tokio::time::sleep(NETWORK_POLL_INTERVAL).await,
            }
        }
        Err(buildit_core::Error::DependencyFailed(format!(
            "timed out waiting for dependency launch {launch_id} to become running"
        ))
        .into())
    }

    async fn start(&self, launch_id: ResourceId, network_id: Option<&str>) -> Result<()> {
        let launch = self.launches.get_by_id(launch_id).await?;
        if launch.status != LaunchStatus::Pending {
            return Ok(());
        }
        let starting = self
            .launches
            .transition(launch_id, LaunchStatus::Starting, None)
            .await?;
        self.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &starting));

        match self.drive_start(&launch).await {
            Ok((container_id, port, instance_url)) => {
                let running = self
                    .launches
                    .mark_running(launch_id, &container_id, Some(port), &instance_url)
                    .await?;
                self.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &running));

                if let Some(network_id) = network_id {
                    let network_id: ResourceId = network_id
                        .parse()
                        .map_err(|_| buildit_core::Error::Validation(format!("invalid network id: {network_id}")))?;
                    self.networks
                        .record_launch_member(network_id, launch_id, &launch.repository_id)
                        .await?;
                }
                Ok(())
            }
            Err(e) => {
                let message = e.truncated_message();
                let failed = self
                    .launches
                    .transition(launch_id, LaunchStatus::Failed, Some(&message))
                    .await?;
                self.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &failed));
                Err(e)
            }
        }
    }

    /// Resolves env, spawns the container, and allocates its preview address.
    /// Returns `(container_id, port, instance_url)`.
    async fn drive_start(&self, launch: &Launch) -> Result<(String, i32, String)> {
        let build = self.builds.get_by_id(launch.build_id).await?;
        if build.status != BuildStatus::Succeeded {
            return Err(buildit_core::Error::DependencyFailed(format!(
                "build {} has not succeeded",
                launch.build_id
            ))
            .into());
        }
        let image_tag = build
            .image_tag
            .clone()
            .ok_or_else(|| buildit_core::Error::Internal("successful build is missing an image tag".to_string()))?;

        let repository = self.repos.get_by_id(&launch.repository_id).await?;
        let env = self.resolve_env(&repository.launch_env_templates, &launch.env).await?;
        let command = launch.command.clone().unwrap_or_default();

        let spec = JobSpec {
            id: launch.id,
            image: image_tag,
            command,
            working_dir: None,
            env,
            resources: ResourceRequirements::default(),
            timeout: None,
            volumes: vec![],
            git_clone: None,
        };
        let handle = self.executor.spawn(spec).await?;

        let port = allocate_preview_port(launch.id);
        let instance_url = self.build_instance_url(&launch.repository_id, launch.id, port);
        Ok((handle.executor_id, port, instance_url))
    }

    /// Merges `repository.launch_env_templates` (defaults) with the launch's own env
    /// (request wins on key collision), expands `fromService` references, and
    /// returns the flattened map an executor needs.
    async fn resolve_env(
        &self,
        templates: &[buildit_core::repository::LaunchEnvTemplate],
        requested: &[EnvVar],
    ) -> Result<HashMap<String, String>> {
        let mut merged: HashMap<String, EnvVar> = templates
            .iter()
            .map(|t| {
                (
                    t.name.clone(),
                    EnvVar {
                        key: t.name.clone(),
                        value: t.default_value.clone(),
                        from_service: None,
                    },
                )
            })
            .collect();
        for var in requested {
            merged.insert(var.key.clone(), var.clone());
        }

        let mut resolved = HashMap::with_capacity(merged.len());
        for (key, var) in merged {
            if let Some(value) = self.resolve_env_value(&var).await? {
                resolved.insert(key, value);
            }
        }
        Ok(resolved)
    }

    async fn resolve_env_value(&self, var: &EnvVar) -> Result<Option<String>> {
        let Some(service_ref) = &var.from_service else {
            return Ok(var.value.clone());
        };
        let resolved = self.resolve_service_ref(service_ref).await?;
        Ok(resolved.or_else(|| var.value.clone()))
    }

    /// Resolves a `ServiceRef` against the service catalog. The catalog only stores
    /// a `base_url` per service, so `Host`/`Port` are parsed out of it and
    /// `InstanceUrl`/`BaseUrl` both resolve to it directly.
    async fn resolve_service_ref(&self, service_ref: &ServiceRef) -> Result<Option<String>> {
        let service = self.services.get_by_slug(&service_ref.service_slug).await?;
        let from_base_url = service.and_then(|s| s.base_url).and_then(|base_url| {
            match service_ref.attribute {
                ServiceAttribute::InstanceUrl | ServiceAttribute::BaseUrl => Some(base_url),
                ServiceAttribute::Host => url::Url::parse(&base_url)
                    .ok()
                    .and_then(|u| u.host_str().map(str::to_string)),
                ServiceAttribute::Port => url::Url::parse(&base_url)
                    .ok()
                    .and_then(|u| u.port_or_known_default())
                    .map(|p| p.to_string()),
            }
        });
        Ok(from_base_url.or_else(|| service_ref.fallback.clone()))
    }

    fn build_instance_url(&self, repository_id: &str, launch_id: ResourceId, port: i32) -> String {
        let direct_url = format!("http://localhost:{port}");
        match (&self.preview.base_url, &self.preview.token_secret) {
            (Some(base_url), Some(secret)) => {
                let token = preview_token(secret, launch_id, repository_id);
                format!("{base_url}?repositoryId={repository_id}&token={token}")
            }
            _ => direct_url,
        }
    }

    async fn stop(&self, launch_id: ResourceId) -> Result<()> {
        let launch = self.launches.get_by_id(launch_id).await?;
        if !matches!(launch.status, LaunchStatus::Running | LaunchStatus::Starting) {
            return Ok(());
        }
        let stopping = self
            .launches
            .transition(launch_id, LaunchStatus::Stopping, None)
            .await?;
        self.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &stopping));

        if let Some(container_id) = &launch.container_id {
            let handle = JobHandle {
                id: launch.id,
                executor_id: container_id.clone(),
                executor_name: self.executor.name().to_string(),
            };
            self.executor.cancel(&handle).await?;
        }

        let stopped = self.launches.mark_stopped(launch_id).await?;
        self.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &stopped));
        Ok(())
    }
}

fn preview_token(secret: &str, launch_id: ResourceId, repository_id: &str) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(format!("{launch_id}:{repository_id}").as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Deterministic ephemeral port in the 20000-29999 range, derived from the launch id
/// so repeated starts of the same launch land on the same port.
fn allocate_preview_port(launch_id: ResourceId) -> i32 {
    let bytes = launch_id.as_uuid().as_u128();
    20000 + (bytes % 10000) as i32
}

pub struct LaunchStartConsumer {
    service: Arc<LaunchService>,
}

impl LaunchStartConsumer {
    pub fn new(service: Arc<LaunchService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PipelineConsumer for LaunchStartConsumer {
    fn queue_name(&self) -> QueueName {
        QueueName::LaunchStart
    }

    async fn handle(&self, payload: Value) -> Result<()> {
        let message: LaunchStartMessage = serde_json::from_value(payload)?;
        let launch_id = parse_launch_id(&message.launch_id)?;
        self.service.start(launch_id, message.network_id.as_deref()).await
    }
}

pub struct LaunchStopConsumer {
    service: Arc<LaunchService>,
}

impl LaunchStopConsumer {
    pub fn new(service: Arc<LaunchService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PipelineConsumer for LaunchStopConsumer {
    fn queue_name(&self) -> QueueName {
        QueueName::LaunchStop
    }

    async fn handle(&self, payload: Value) -> Result<()> {
        let message: LaunchStopMessage = serde_json::from_value(payload)?;
        let launch_id = parse_launch_id(&message.launch_id)?;
        self.service.stop(launch_id).await
    }
}

fn parse_launch_id(raw: &str) -> Result<ResourceId> {
    raw.parse()
        .map_err(|_| SchedulerError::from(buildit_core::Error::Validation(format!("invalid launch id: {raw}"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_ports_are_stable_for_the_same_launch() {
        let id = ResourceId::new();
        assert_eq!(allocate_preview_port(id), allocate_preview_port(id));
    }

    #[test]
    fn preview_tokens_are_deterministic() {
        let id = ResourceId::new();
        let a = preview_token("secret", id, "app-1");
        let b = preview_token("secret", id, "app-1");
        assert_eq!(a, b);
        assert_ne!(a, preview_token("other-secret", id, "app-1"));
    }
}
