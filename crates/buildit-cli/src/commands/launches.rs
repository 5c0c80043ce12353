//! Launch commands.

use anyhow::Result;
use serde_json::json;

use crate::client::ApiClient;

pub async fn start(client: &ApiClient, repository_id: &str) -> Result<()> {
    let body = client
        .post("/launches", &json!({ "repositoryId": repository_id }))
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn list(client: &ApiClient, app_id: &str) -> Result<()> {
    let body = client.get(&format!("/apps/{app_id}/launches")).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn stop(client: &ApiClient, app_id: &str, launch_id: &str) -> Result<()> {
    let body = client
        .post(
            &format!("/apps/{app_id}/launches/{launch_id}/stop"),
            &json!({}),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
