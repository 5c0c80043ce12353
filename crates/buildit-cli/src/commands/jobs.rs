//! Job definition and run-dispatch commands.

use anyhow::Result;
use serde_json::{Value, json};

use crate::client::ApiClient;

pub async fn list(client: &ApiClient) -> Result<()> {
    let body = client.get("/jobs").await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn run(client: &ApiClient, slug: &str, parameters: Option<String>) -> Result<()> {
    let parameters: Value = match parameters {
        Some(raw) => serde_json::from_str(&raw)?,
        None => json!({}),
    };
    let body = client
        .post(
            &format!("/jobs/{slug}/run"),
            &json!({ "parameters": parameters }),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn regenerate_bundle(client: &ApiClient, slug: &str) -> Result<()> {
    let body = client
        .post(&format!("/jobs/{slug}/bundle/regenerate"), &json!({}))
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
