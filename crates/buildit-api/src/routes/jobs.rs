//! Job definition endpoints: catalog listing/creation/update, run dispatch, and
//! on-demand bundle regeneration.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::Value;

use buildit_core::events::{ChangeEvent, EventKind};
use buildit_core::job::{JobDefinition, JobRuntime, RetryPolicy, validate_slug};
use buildit_db::{JobDefinitionRepo, JobRunRepo};

use crate::AppState;
use crate::auth::require_scopes;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/{slug}", patch(update_job))
        .route("/jobs/{slug}/run", post(run_job))
        .route("/jobs/{slug}/bundle/regenerate", post(regenerate_bundle))
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let defs = state.job_defs.list().await?;
    Ok(Json(serde_json::json!({ "data": defs })))
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub slug: String,
    pub name: String,
    pub job_type: String,
    pub version: String,
    pub runtime: JobRuntime,
    pub entry_point: String,
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    pub parameters_schema: Option<Value>,
    #[serde(default = "default_params")]
    pub default_parameters: Value,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

fn default_params() -> Value {
    Value::Object(Default::default())
}

fn default_metadata() -> Value {
    Value::Object(Default::default())
}

async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateJobRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_scopes(&state.auth, &headers, &["jobs:write"])?;
    validate_slug(&req.slug)?;

    let now = chrono::Utc::now();
    let def = JobDefinition {
        slug: req.slug,
        name: req.name,
        job_type: req.job_type,
        version: req.version,
        runtime: req.runtime,
        entry_point: req.entry_point,
        timeout_ms: req.timeout_ms,
        retry_policy: req.retry_policy.unwrap_or_default(),
        parameters_schema: req.parameters_schema,
        default_parameters: req.default_parameters,
        metadata: req.metadata,
        created_at: now,
        updated_at: now,
    };
    let created = state.job_defs.upsert(&def).await?;
    Ok(Json(serde_json::json!({ "data": created })))
}

#[derive(Debug, Deserialize)]
pub struct UpdateJobRequest {
    pub name: Option<String>,
    pub version: Option<String>,
    pub entry_point: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retry_policy: Option<RetryPolicy>,
    pub parameters_schema: Option<Value>,
    pub default_parameters: Option<Value>,
    pub metadata: Option<Value>,
}

async fn update_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(req): Json<UpdateJobRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_scopes(&state.auth, &headers, &["jobs:write"])?;
    let mut def = state.job_defs.get_by_slug(&slug).await?;
    if let Some(name) = req.name {
        def.name = name;
    }
    if let Some(version) = req.version {
        def.version = version;
    }
    if let Some(entry_point) = req.entry_point {
        def.entry_point = entry_point;
    }
    if let Some(timeout_ms) = req.timeout_ms {
        def.timeout_ms = timeout_ms;
    }
    if let Some(retry_policy) = req.retry_policy {
        def.retry_policy = retry_policy;
    }
    if req.parameters_schema.is_some() {
        def.parameters_schema = req.parameters_schema;
    }
    if let Some(default_parameters) = req.default_parameters {
        def.default_parameters = default_parameters;
    }
    if let Some(metadata) = req.metadata {
        def.metadata = metadata;
    }
    let updated = state.job_defs.upsert(&def).await?;
    Ok(Json(serde_json::json!({ "data": updated })))
}

#[derive(Debug, Deserialize)]
pub struct RunJobRequest {
    #[serde(default = "default_params")]
    pub parameters: Value,
    pub timeout_ms: Option<u64>,
}

async fn run_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
    Json(req): Json<RunJobRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_scopes(&state.auth, &headers, &["jobs:run"])?;
    let def = state.job_defs.get_by_slug(&slug).await?;
    let timeout_ms = req.timeout_ms.unwrap_or(def.timeout_ms);

    let run = state
        .job_runs
        .create(&slug, req.parameters, timeout_ms, None)
        .await?;
    state.events.publish(ChangeEvent::new(EventKind::JobRunUpdated, &run));

    state
        .queue
        .enqueue(
            buildit_scheduler::QueueName::JobRun,
            serde_json::json!({ "job_run_id": run.id.to_string() }),
            buildit_scheduler::EnqueueOptions::default(),
        )
        .await
        .map_err(|e| ApiError::BadGateway(e.to_string()))?;

    Ok(Json(serde_json::json!({ "data": run })))
}

async fn regenerate_bundle(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(slug): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_scopes(&state.auth, &headers, &["job-bundles:write"])?;
    let def = state.job_defs.get_by_slug(&slug).await?;
    let entry = buildit_core::job::EntryPoint::parse(&def.entry_point);
    let (_existing_slug, version) = match entry {
        buildit_core::job::EntryPoint::Bundle { slug, version, .. } => (slug, version),
        buildit_core::job::EntryPoint::Inline(_) => {
            return Err(ApiError::BadRequest("job is not bundle-backed".to_string()));
        }
    };

    let regenerated = state.bundle_recovery.recover(&def, &slug, &version).await?;

    Ok(Json(serde_json::json!({ "data": regenerated })))
}
