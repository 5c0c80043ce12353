//! Job-run listing endpoint.

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use buildit_core::job_run::JobRunStatus;

use crate::AppState;
use crate::auth::require_scopes;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/job-runs", get(list_job_runs))
}

#[derive(Debug, Deserialize, Default)]
pub struct ListJobRunsQuery {
    pub status: Option<String>,
    pub job: Option<String>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn parse_status(raw: &str) -> Option<JobRunStatus> {
    match raw {
        "pending" => Some(JobRunStatus::Pending),
        "running" => Some(JobRunStatus::Running),
        "succeeded" => Some(JobRunStatus::Succeeded),
        "failed" => Some(JobRunStatus::Failed),
        "canceled" => Some(JobRunStatus::Canceled),
        "expired" => Some(JobRunStatus::Expired),
        _ => None,
    }
}

async fn list_job_runs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListJobRunsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_scopes(&state.auth, &headers, &["job-runs:list"])?;

    let status = query.status.as_deref().and_then(parse_status);
    let limit = query.limit.unwrap_or(20).clamp(1, 50);
    let offset = query.offset.unwrap_or(0).max(0);

    let runs = state
        .job_runs
        .list_filtered(status, query.job.as_deref(), query.search.as_deref(), limit, offset)
        .await?;

    Ok(Json(serde_json::json!({ "data": runs })))
}
