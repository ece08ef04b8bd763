use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::error::{CredentialError, Result};
use super::token::TokenCredential;

const GRAPH_TIMEOUT_MS: u64 = 15_000;

/// Graph-style REST client authenticated with the live credential
pub struct GraphClient {
    http: Client,
    base_url: String,
    scope: String,
    credential: Arc<dyn TokenCredential>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("base_url", &self.base_url)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Builds the client and proves the credential can obtain a graph token.
    /// Any failure here means graph access is not configured for this identity.
    pub async fn connect(
        base_url: &str,
        scope: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(GRAPH_TIMEOUT_MS))
            .build()
            .map_err(|e| CredentialError::GraphNotConfigured(format!("HTTP client: {e}")))?;
        credential
            .get_token(&[scope.to_string()])
            .await
            .map_err(|e| CredentialError::GraphNotConfigured(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            scope: scope.to_string(),
            credential,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticated GET of `path` relative to the base URL (e.g. `me`, `users/{id}`)
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        debug!(target: "credentials", url = %url, "Graph GET");
        let token = self.credential.get_token(&[self.scope.clone()]).await?;
        let resp = self
            .http
            .get(&url)
            .bearer_auth(token.token)
            .send()
            .await
            .map_err(|e| CredentialError::Graph(format!("HTTP error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Graph(format!("status={status} body={body}")));
        }
        resp.json()
            .await
            .map_err(|e| CredentialError::Graph(format!("invalid JSON: {e}")))
    }
}
