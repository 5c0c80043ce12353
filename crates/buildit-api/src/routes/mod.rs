//! HTTP control API routes (C11).

pub mod apps;
pub mod builds;
pub mod health;
pub mod job_bundles;
pub mod job_runs;
pub mod jobs;
pub mod launches;
pub mod networks;

use crate::AppState;
use crate::ws::ws_handler;
use axum::Router;
use axum::routing::get;

/// Build the main API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(apps::router())
        .merge(builds::router())
        .merge(launches::router())
        .merge(networks::router())
        .merge(jobs::router())
        .merge(job_runs::router())
        .merge(job_bundles::router())
        .route("/ws", get(ws_handler))
        .with_state(state)
}
