//! Service network endpoints: create a network of member repositories and start
//! their launches in `launch_order`, respecting `depends_on`/`wait_for_build`.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use buildit_core::ResourceId;
use buildit_core::launch::{EnvVar, NetworkMember};
use buildit_db::ServiceNetworkRepo;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/service-networks", post(create_network))
        .route("/service-networks/{id}", get(get_network))
}

#[derive(Debug, Deserialize)]
pub struct CreateNetworkMember {
    pub repository_id: String,
    pub launch_order: i32,
    #[serde(default)]
    pub wait_for_build: bool,
    #[serde(default)]
    pub env: Vec<EnvVar>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateNetworkRequest {
    pub name: String,
    pub members: Vec<CreateNetworkMember>,
}

/// Creates the network and its members, then starts the sequenced launches in the
/// background: the response returns as soon as bookkeeping is in place, not once every
/// member is running.
async fn create_network(
    State(state): State<AppState>,
    Json(req): Json<CreateNetworkRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.members.is_empty() {
        return Err(ApiError::BadRequest("a service network needs at least one member".to_string()));
    }

    let network = state.service_networks.create(&req.name).await?;
    for member in &req.members {
        state
            .service_networks
            .add_member(&NetworkMember {
                network_id: network.id,
                repository_id: member.repository_id.clone(),
                launch_order: member.launch_order,
                wait_for_build: member.wait_for_build,
                env: member.env.clone(),
                depends_on: member.depends_on.clone(),
            })
            .await?;
    }

    let launch_service = state.launch_service.clone();
    let network_id = network.id;
    tokio::spawn(async move {
        if let Err(e) = launch_service.start_network(network_id).await {
            tracing::error!(network_id = %network_id, error = %e, "service network launch sequence failed");
        }
    });

    let members = state.service_networks.list_members(network.id).await?;
    Ok(Json(serde_json::json!({ "data": { "network": network, "members": members } })))
}

async fn get_network(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let network_id: ResourceId = id.parse().map_err(|_| ApiError::BadRequest(format!("invalid network id {id}")))?;
    let members = state.service_networks.list_members(network_id).await?;
    Ok(Json(serde_json::json!({ "data": { "members": members } })))
}
