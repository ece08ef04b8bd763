use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use super::error::Result;

/// Tokens are refreshed this long before they actually expire
const EXPIRY_SKEW_SECS: i64 = 300;

/// Bearer token issued for a set of scopes
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub token: String,
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// True once the token is inside the refresh window
    pub fn is_expiring(&self) -> bool {
        self.expires_on - Duration::seconds(EXPIRY_SKEW_SECS) <= Utc::now()
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Anything that can mint bearer tokens for a scope set
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken>;
}

/// Per-scope-set token cache shared by the HTTP-backed credentials
#[derive(Default)]
pub struct TokenCache {
    entries: DashMap<String, AccessToken>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, scopes: &[String]) -> Option<AccessToken> {
        let key = cache_key(scopes);
        let hit = self.entries.get(&key).map(|e| e.value().clone())?;
        if hit.is_expiring() {
            self.entries.remove(&key);
            return None;
        }
        Some(hit)
    }

    pub fn insert(&self, scopes: &[String], token: AccessToken) {
        self.entries.insert(cache_key(scopes), token);
    }
}

fn cache_key(scopes: &[String]) -> String {
    let mut sorted: Vec<&str> = scopes.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.join(" ")
}

/// Empty scope lists fall back to the platform default scope
pub fn normalize_scopes(scopes: &[String], default_scope: &str) -> Vec<String> {
    let cleaned: Vec<String> = scopes
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.is_empty() {
        vec![default_scope.to_string()]
    } else {
        cleaned
    }
}

/// Resource-style endpoints (managed identity, CLI) take `https://x/` instead of `https://x/.default`
pub fn scope_to_resource(scope: &str) -> String {
    scope
        .strip_suffix("/.default")
        .unwrap_or(scope)
        .to_string()
}
