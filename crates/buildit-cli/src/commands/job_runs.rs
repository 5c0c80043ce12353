//! Job run commands.

use anyhow::Result;

use crate::client::ApiClient;

pub async fn list(
    client: &ApiClient,
    status: Option<String>,
    job: Option<String>,
    limit: u32,
) -> Result<()> {
    let mut path = format!("/job-runs?limit={limit}");
    if let Some(status) = &status {
        path.push_str(&format!("&status={status}"));
    }
    if let Some(job) = &job {
        path.push_str(&format!("&job={job}"));
    }
    let body = client.get(&path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
