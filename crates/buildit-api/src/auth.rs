//! Operator token scopes (C11): a static, env-sourced table mapping bearer
//! tokens to the scopes they carry. No external identity provider is in scope;
//! tokens are opaque strings configured alongside the rest of the process env.

use std::collections::{HashMap, HashSet};

use axum::http::HeaderMap;

use crate::error::ApiError;

/// `jobs:write`, `jobs:run`, `job-bundles:write`, `job-runs:list` are the scopes the
/// route table actually checks; any other string is accepted as a scope too, since the
/// table is just a bag of strings per token.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    tokens: HashMap<String, HashSet<String>>,
}

impl AuthConfig {
    /// Parse `BUILDIT_API_TOKENS`, formatted as `token:scope1,scope2;token2:scope3`.
    /// Missing or empty env var yields a config with no valid tokens (every scoped
    /// route then returns 401).
    pub fn from_env() -> Self {
        let raw = std::env::var("BUILDIT_API_TOKENS").unwrap_or_default();
        let mut tokens = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let Some((token, scopes)) = entry.split_once(':') else {
                continue;
            };
            let scopes = scopes
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            tokens.insert(token.trim().to_string(), scopes);
        }
        Self { tokens }
    }

    fn scopes_for(&self, token: &str) -> Option<&HashSet<String>> {
        self.tokens.get(token)
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Require the caller's bearer token to carry every scope in `required`. Returns 401 if
/// the token is missing or unrecognized, 403 with `{error:"insufficient_scope"}` if the
/// token is valid but lacks a required scope.
pub fn require_scopes(auth: &AuthConfig, headers: &HeaderMap, required: &[&str]) -> Result<(), ApiError> {
    let token = bearer_token(headers).ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;
    let scopes = auth
        .scopes_for(token)
        .ok_or_else(|| ApiError::Unauthorized("unrecognized token".to_string()))?;
    for scope in required {
        if !scopes.contains(*scope) {
            return Err(ApiError::InsufficientScope(scope.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_token_table() {
        unsafe {
            std::env::set_var("BUILDIT_API_TOKENS", "abc:jobs:write,jobs:run;def:job-runs:list");
        }
        let config = AuthConfig::from_env();
        assert!(config.scopes_for("abc").unwrap().contains("jobs:run"));
        assert!(config.scopes_for("def").unwrap().contains("job-runs:list"));
        assert!(config.scopes_for("ghost").is_none());
        unsafe {
            std::env::remove_var("BUILDIT_API_TOKENS");
        }
    }
}
