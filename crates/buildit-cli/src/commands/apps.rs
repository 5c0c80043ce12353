//! Repository catalog commands.

use anyhow::Result;
use serde_json::json;

use crate::client::ApiClient;

pub async fn list(client: &ApiClient, q: Option<String>, status: Option<String>) -> Result<()> {
    let mut path = "/apps".to_string();
    let mut params = vec![];
    if let Some(q) = &q {
        params.push(format!("q={q}"));
    }
    if let Some(status) = &status {
        params.push(format!("status={status}"));
    }
    if !params.is_empty() {
        path.push('?');
        path.push_str(&params.join("&"));
    }
    let body = client.get(&path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn show(client: &ApiClient, id: &str) -> Result<()> {
    let body = client.get(&format!("/apps/{id}")).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn create(
    client: &ApiClient,
    name: &str,
    repo_url: &str,
    description: Option<String>,
    dockerfile_path: Option<String>,
) -> Result<()> {
    let body = client
        .post(
            "/apps",
            &json!({
                "name": name,
                "repoUrl": repo_url,
                "description": description,
                "dockerfilePath": dockerfile_path,
                "tags": [],
            }),
        )
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn retry(client: &ApiClient, id: &str) -> Result<()> {
    let body = client.post(&format!("/apps/{id}/retry"), &json!({})).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn history(client: &ApiClient, id: &str) -> Result<()> {
    let body = client.get(&format!("/apps/{id}/history")).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

pub async fn builds(client: &ApiClient, id: &str, limit: u32, offset: u32) -> Result<()> {
    let body = client
        .get(&format!("/apps/{id}/builds?limit={limit}&offset={offset}"))
        .await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
