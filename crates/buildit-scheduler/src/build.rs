//! Build pipeline (C7): clone the repository at its recorded commit and run the
//! image-build job through the executor trait, streaming logs as it goes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;

use buildit_core::build::BuildStatus;
use buildit_core::events::{ChangeEvent, EventBus, EventKind};
use buildit_core::executor::{Executor, GitCloneSpec, JobSpec, JobStatus, ResourceRequirements};
use buildit_core::ResourceId;
use buildit_db::{BuildRepo, RepositoryRepo};

use crate::error::Result;
use crate::poller::PipelineConsumer;
use crate::queue::QueueName;

#[derive(Debug, Deserialize)]
struct BuildMessage {
    build_id: String,
}

pub struct BuildConsumer {
    builds: Arc<dyn BuildRepo>,
    repos: Arc<dyn RepositoryRepo>,
    executor: Arc<dyn Executor>,
    events: Arc<EventBus>,
}

impl BuildConsumer {
    pub fn new(
        builds: Arc<dyn BuildRepo>,
        repos: Arc<dyn RepositoryRepo>,
        executor: Arc<dyn Executor>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            builds,
            repos,
            executor,
            events,
        }
    }

    async fn run_build(&self, build_id: ResourceId) -> Result<()> {
        let build = self.builds.get_by_id(build_id).await?;
        if build.status != BuildStatus::Pending {
            return Ok(());
        }
        let running = self.builds.mark_running(build_id).await?;
        self.events.publish(ChangeEvent::new(EventKind::BuildUpdated, &running));

        let repository = self.repos.get_by_id(&build.repository_id).await?;
        let image_tag = format!(
            "buildit/{}:{}",
            repository.id,
            build.commit_sha.as_deref().unwrap_or("latest")
        );
        let dockerfile_path = repository
            .dockerfile_path
            .clone()
            .unwrap_or_else(|| "Dockerfile".to_string());

        let spec = JobSpec {
            id: build_id,
            image: "docker:24-cli".to_string(),
            command: vec![
                "sh".to_string(),
                "-c".to_string(),
                format!("docker build -f {dockerfile_path} -t {image_tag} ."),
            ],
            working_dir: Some("/workspace".to_string()),
            env: HashMap::new(),
            resources: ResourceRequirements::default(),
            timeout: None,
            volumes: vec![],
            git_clone: Some(GitCloneSpec {
                url: repository.repo_url.clone(),
                branch: build.git_branch.clone(),
                sha: build.commit_sha.clone(),
                target_dir: "/workspace".to_string(),
                depth: Some(1),
                access_token: None,
            }),
        };

        match self.drive_build(spec).await {
            Ok(()) => {
                let completed = self
                    .builds
                    .complete(build_id, BuildStatus::Succeeded, Some(&image_tag), None)
                    .await?;
                self.events.publish(ChangeEvent::new(EventKind::BuildUpdated, &completed));
                Ok(())
            }
            Err(e) => {
                let message = e.truncated_message();
                let completed = self
                    .builds
                    .complete(build_id, BuildStatus::Failed, None, Some(&message))
                    .await?;
                self.events.publish(ChangeEvent::new(EventKind::BuildUpdated, &completed));
                Err(e)
            }
        }
    }

    async fn drive_build(&self, spec: JobSpec) -> Result<()> {
        let build_id = spec.id;
        let handle = self.executor.spawn(spec).await?;

        let mut logs = self.executor.logs(&handle).await?;
        while let Some(line) = logs.next().await {
            self.builds
                .append_log(build_id, &format!("{}\n", line.content))
                .await?;
        }

        let result = self.executor.wait(&handle).await?;
        match result.status {
            JobStatus::Succeeded { .. } => Ok(()),
            JobStatus::Failed { message, .. } => Err(buildit_core::Error::DependencyFailed(message).into()),
            other => Err(buildit_core::Error::Internal(format!(
                "build job ended in unexpected state: {other:?}"
            ))
            .into()),
        }
    }
}

#[async_trait]
impl PipelineConsumer for BuildConsumer {
    fn queue_name(&self) -> QueueName {
        QueueName::Build
    }

    async fn handle(&self, payload: Value) -> Result<()> {
        let message: BuildMessage = serde_json::from_value(payload)?;
        let build_id: ResourceId = message
            .build_id
            .parse()
            .map_err(|_| buildit_core::Error::Validation(format!("invalid build id: {}", message.build_id)))?;
        self.run_build(build_id).await
    }
}
