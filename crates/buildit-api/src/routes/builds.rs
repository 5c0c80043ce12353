//! Build endpoints: retry and log retrieval.

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use buildit_core::ResourceId;
use buildit_core::build::{Build, BuildStatus};
use buildit_core::events::{ChangeEvent, EventKind};
use buildit_db::BuildRepo;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/builds/{id}/retry", post(retry_build))
        .route("/builds/{id}/logs", get(build_logs))
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub id: String,
    pub repository_id: String,
    pub status: BuildStatus,
    pub image_tag: Option<String>,
    pub error_message: Option<String>,
    pub commit_sha: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_ms: Option<i64>,
}

impl From<Build> for BuildSummary {
    fn from(b: Build) -> Self {
        BuildSummary {
            id: b.id.to_string(),
            repository_id: b.repository_id,
            status: b.status,
            image_tag: b.image_tag,
            error_message: b.error_message,
            commit_sha: b.commit_sha,
            created_at: b.created_at,
            completed_at: b.completed_at,
            duration_ms: b.duration_ms,
        }
    }
}

fn parse_id(id: &str) -> Result<ResourceId, ApiError> {
    id.parse().map_err(|_| ApiError::BadRequest(format!("invalid id {id}")))
}

async fn retry_build(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let id = parse_id(&id)?;
    let build = state.builds.get_by_id(id).await?;
    if !matches!(build.status, BuildStatus::Failed) {
        return Err(ApiError::Conflict("build is not in a retryable state".to_string()));
    }

    let retried = state
        .builds
        .create(&build.repository_id, build.commit_sha.as_deref(), build.git_branch.as_deref(), build.git_ref.as_deref())
        .await?;
    state.events.publish(ChangeEvent::new(EventKind::BuildUpdated, &retried));

    state
        .queue
        .enqueue(
            buildit_scheduler::QueueName::Build,
            serde_json::json!({ "build_id": retried.id.to_string() }),
            buildit_scheduler::EnqueueOptions::default(),
        )
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    Ok(Json(serde_json::json!({ "data": retried })))
}

#[derive(Debug, Deserialize, Default)]
pub struct LogsQuery {
    #[serde(default)]
    pub download: Option<i32>,
}

async fn build_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogsQuery>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let build = state.builds.get_by_id(id).await?;

    if query.download.unwrap_or(0) == 1 {
        Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            build.logs,
        )
            .into_response())
    } else {
        Ok(Json(serde_json::json!({ "data": { "logs": build.logs, "preview": build.log_preview() } })).into_response())
    }
}
