//! Signed job-bundle artifact download.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use buildit_db::JobBundleRepo;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/job-bundles/{slug}/versions/{version}/download", get(download))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub expires: i64,
    pub token: String,
    pub filename: Option<String>,
}

async fn download(
    State(state): State<AppState>,
    Path((slug, version)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let bundle = state.job_bundles.get(&slug, &version).await?;

    let expires_at = chrono::DateTime::from_timestamp_millis(query.expires)
        .ok_or_else(|| ApiError::Unauthorized("malformed expiry".to_string()))?;
    buildit_bundle_store::token::verify(
        &state.config.signing_secret,
        &slug,
        &version,
        &bundle.artifact_path,
        expires_at,
        &query.token,
    )?;

    let data: Bytes = state.bundle_store.get(&bundle).await?;
    let filename = query.filename.unwrap_or_else(|| {
        bundle.artifact_path.rsplit('/').next().unwrap_or("bundle.tar.gz").to_string()
    });

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/gzip".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        data,
    )
        .into_response())
}
