//! Repository catalog endpoints: search/create/retry ingestion/history/builds.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use buildit_core::ResourceId;
use buildit_core::events::{ChangeEvent, EventKind};
use buildit_core::repository::{IngestStatus, Repository};
use buildit_db::RepositoryRepo;

use crate::AppState;
use crate::error::ApiError;
use crate::routes::builds::BuildSummary;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/apps", get(list_apps).post(create_app))
        .route("/apps/{id}", get(get_app))
        .route("/apps/{id}/retry", post(retry_app))
        .route("/apps/{id}/history", get(app_history))
        .route("/apps/{id}/builds", get(app_builds))
}

// axum's `Query` extractor (serde_urlencoded) doesn't collect repeated keys into a
// `Vec`, so multi-valued facets are accepted comma-separated: `tags=a:b,c:d`.
#[derive(Debug, Deserialize, Default)]
pub struct ListAppsQuery {
    pub q: Option<String>,
    pub tags: Option<String>,
    pub status: Option<String>,
    pub ingested_after: Option<chrono::DateTime<chrono::Utc>>,
    pub ingested_before: Option<chrono::DateTime<chrono::Utc>>,
}

async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<ListAppsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repos = state.repositories.list().await?;

    let wanted_tags: Vec<(String, String)> = query
        .tags
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|t| t.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let wanted_status: Vec<IngestStatus> = query
        .status
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| match s {
            "seed" => Some(IngestStatus::Seed),
            "pending" => Some(IngestStatus::Pending),
            "processing" => Some(IngestStatus::Processing),
            "ready" => Some(IngestStatus::Ready),
            "failed" => Some(IngestStatus::Failed),
            _ => None,
        })
        .collect();

    let mut matched = Vec::new();
    for repo in repos {
        if !wanted_status.is_empty() && !wanted_status.contains(&repo.ingest_status) {
            continue;
        }
        if let Some(after) = query.ingested_after {
            if repo.last_ingested_at.map(|t| t < after).unwrap_or(true) {
                continue;
            }
        }
        if let Some(before) = query.ingested_before {
            if repo.last_ingested_at.map(|t| t > before).unwrap_or(true) {
                continue;
            }
        }
        if let Some(q) = &query.q {
            let q = q.to_lowercase();
            if !repo.name.to_lowercase().contains(&q)
                && !repo.description.as_deref().unwrap_or_default().to_lowercase().contains(&q)
            {
                continue;
            }
        }
        if !wanted_tags.is_empty() {
            let tags = state.repositories.list_tags(&repo.id.to_string()).await?;
            let has_all = wanted_tags.iter().all(|(k, v)| {
                tags.iter().any(|t| &t.key == k && &t.value == v)
            });
            if !has_all {
                continue;
            }
        }
        matched.push(repo);
    }

    Ok(Json(serde_json::json!({ "data": matched })))
}

#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    pub name: String,
    pub description: Option<String>,
    pub repo_url: String,
    pub dockerfile_path: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct AppResponse {
    #[serde(flatten)]
    pub repository: Repository,
}

async fn create_app(
    State(state): State<AppState>,
    Json(req): Json<CreateAppRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.name.trim().is_empty() || req.repo_url.trim().is_empty() {
        return Err(ApiError::BadRequest("name and repoUrl are required".to_string()));
    }

    let id = ResourceId::new().to_string();
    let repo = state
        .repositories
        .create(
            &id,
            &req.repo_url,
            &req.name,
            req.description.as_deref(),
            req.dockerfile_path.as_deref(),
        )
        .await?;

    if !req.tags.is_empty() {
        let tags: Vec<(String, String)> = req
            .tags
            .iter()
            .filter_map(|t| t.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        state.repositories.replace_system_tags_and_previews(&id, &tags, &[]).await?;
    }

    let transitioned = state
        .repositories
        .transition_ingest_status(&id, IngestStatus::Pending, None)
        .await?;
    state.events.publish(ChangeEvent::new(EventKind::RepositoryUpdated, &transitioned));

    state
        .queue
        .enqueue(
            buildit_scheduler::QueueName::Ingest,
            serde_json::json!({ "repository_id": id }),
            buildit_scheduler::EnqueueOptions::default(),
        )
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    Ok(Json(serde_json::json!({ "data": transitioned })))
}

async fn get_app(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = state.repositories.get_by_id(&id).await?;
    let tags = state.repositories.list_tags(&id).await?;
    let previews = state.repositories.list_previews(&id).await?;
    Ok(Json(serde_json::json!({ "data": repo, "tags": tags, "previews": previews })))
}

async fn retry_app(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = state.repositories.get_by_id(&id).await?;
    if !repo.ingest_status.can_transition_to(IngestStatus::Pending) {
        return Err(ApiError::Conflict(format!(
            "cannot retry ingestion from status {:?}",
            repo.ingest_status
        )));
    }
    let transitioned = state
        .repositories
        .transition_ingest_status(&id, IngestStatus::Pending, None)
        .await?;
    state.events.publish(ChangeEvent::new(EventKind::RepositoryUpdated, &transitioned));

    state
        .queue
        .enqueue(
            buildit_scheduler::QueueName::Ingest,
            serde_json::json!({ "repository_id": id }),
            buildit_scheduler::EnqueueOptions::default(),
        )
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    Ok(Json(serde_json::json!({ "data": transitioned })))
}

async fn app_history(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<serde_json::Value>, ApiError> {
    let events = state.repositories.list_ingestion_events(&id).await?;
    Ok(Json(serde_json::json!({ "data": events })))
}

#[derive(Debug, Deserialize, Default)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

async fn app_builds(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let builds = state.builds.list_by_repository(&id).await?;
    let offset = page.offset.unwrap_or(0).max(0) as usize;
    let limit = page.limit.unwrap_or(20).clamp(1, 100) as usize;
    let page: Vec<BuildSummary> = builds
        .into_iter()
        .skip(offset)
        .take(limit)
        .map(BuildSummary::from)
        .collect();
    Ok(Json(serde_json::json!({ "data": page })))
}
