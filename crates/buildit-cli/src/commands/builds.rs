//! Build commands.

use anyhow::Result;
use serde_json::json;

use crate::client::ApiClient;

pub async fn retry(client: &ApiClient, id: &str) -> Result<()> {
    let body = client
        .post(&format!("/builds/{id}/retry"), &json!({}))
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn logs(client: &ApiClient, id: &str) -> Result<()> {
    let body = client.get(&format!("/builds/{id}/logs")).await?;
    if let Some(logs) = body.get("logs").and_then(serde_json::Value::as_str) {
        println!("{logs}");
    } else {
        println!("{}", serde_json::to_string_pretty(&body)?);
    }
    Ok(())
}
