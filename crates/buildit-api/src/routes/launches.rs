//! Launch endpoints: start, list, stop.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use buildit_core::ResourceId;
use buildit_core::events::{ChangeEvent, EventKind};
use buildit_core::launch::{EnvVar, LaunchStatus};
use buildit_db::{BuildRepo, LaunchRepo};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/launches", post(start_launch))
        .route("/apps/{id}/launches", get(list_launches))
        .route("/apps/{id}/launches/{lid}/stop", post(stop_launch))
}

#[derive(Debug, Deserialize)]
pub struct StartLaunchRequest {
    pub repository_id: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    pub resource_profile: Option<String>,
    pub command: Option<Vec<String>>,
}

async fn start_launch(
    State(state): State<AppState>,
    Json(req): Json<StartLaunchRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let build = state
        .builds
        .latest_succeeded(&req.repository_id)
        .await?
        .ok_or_else(|| ApiError::Conflict("no succeeded build to launch".to_string()))?;

    let launch = state
        .launches
        .create(
            &req.repository_id,
            build.id,
            &req.env,
            req.resource_profile.as_deref(),
            req.command.as_deref(),
        )
        .await?;
    state.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &launch));

    state
        .queue
        .enqueue(
            buildit_scheduler::QueueName::LaunchStart,
            serde_json::json!({ "launch_id": launch.id.to_string() }),
            buildit_scheduler::EnqueueOptions::default(),
        )
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    Ok(Json(serde_json::json!({ "data": launch })))
}

async fn list_launches(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let launches = state.launches.list_by_repository(&id).await?;
    Ok(Json(serde_json::json!({ "data": launches })))
}

async fn stop_launch(
    State(state): State<AppState>,
    Path((_id, lid)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lid: ResourceId = lid.parse().map_err(|_| ApiError::BadRequest(format!("invalid launch id {lid}")))?;
    let launch = state.launches.get_by_id(lid).await?;
    if !launch.status.can_transition_to(LaunchStatus::Stopping) {
        return Err(ApiError::Conflict(format!("cannot stop launch in status {:?}", launch.status)));
    }
    let stopping = state.launches.transition(lid, LaunchStatus::Stopping, None).await?;
    state.events.publish(ChangeEvent::new(EventKind::LaunchUpdated, &stopping));

    state
        .queue
        .enqueue(
            buildit_scheduler::QueueName::LaunchStop,
            serde_json::json!({ "launch_id": lid.to_string() }),
            buildit_scheduler::EnqueueOptions::default(),
        )
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    Ok(Json(serde_json::json!({ "data": stopping })))
}
