//! Thin HTTP client over the control API (C11).

use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::Value;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn unwrap_response(resp: reqwest::Response) -> Result<Value> {
        let status = resp.status();
        let body: Value = resp
            .json()
            .await
            .context("failed to decode API response as JSON")?;
        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("request failed");
            bail!("{} ({})", message, status);
        }
        Ok(body)
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .authed(self.http.get(self.url(path)))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        Self::unwrap_response(resp).await
    }

    pub async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let resp = self
            .authed(self.http.post(self.url(path)))
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?;
        Self::unwrap_response(resp).await
    }

    pub async fn patch<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let resp = self
            .authed(self.http.patch(self.url(path)))
            .json(body)
            .send()
            .await
            .with_context(|| format!("PATCH {path} failed"))?;
        Self::unwrap_response(resp).await
    }
}
