//! Concrete token credentials, one per strategy
//!
//! All of them cache tokens per scope set and talk plain HTTPS through reqwest.
//! The certificate credential proves possession of its key with a signed
//! client assertion rather than a shared secret.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::debug;

use super::assertion::{AssertionSigner, CLIENT_ASSERTION_TYPE};
use super::certificate::CertificateSource;
use super::error::{CredentialError, Result};
use super::token::{scope_to_resource, AccessToken, TokenCache, TokenCredential};
use crate::config::{env_opt, PlatformIdentityHints};

const TOKEN_REQUEST_TIMEOUT_MS: u64 = 10_000;
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const CLI_TIMEOUT_MS: u64 = 15_000;

fn http_client() -> Result<Client> {
    Client::builder()
        .use_rustls_tls()
        .timeout(Duration::from_millis(TOKEN_REQUEST_TIMEOUT_MS))
        .build()
        .map_err(|e| CredentialError::Token(format!("Failed to build HTTP client: {e}")))
}

pub(crate) fn token_url(authority_host: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/v2.0/token",
        authority_host.trim_end_matches('/'),
        tenant_id
    )
}

/// Send a token request and turn the JSON body into an `AccessToken`
async fn fetch_token(req: RequestBuilder, source: &str) -> Result<AccessToken> {
    let resp = req
        .send()
        .await
        .map_err(|e| CredentialError::Token(format!("{source}: HTTP error: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| {
                v.get("error_description")
                    .or_else(|| v.get("error"))
                    .and_then(|d| d.as_str())
                    .map(str::to_string)
            })
            .unwrap_or(body);
        return Err(CredentialError::Token(format!(
            "{source}: status={status} {detail}"
        )));
    }
    let val: Value = resp
        .json()
        .await
        .map_err(|e| CredentialError::Token(format!("{source}: invalid token JSON: {e}")))?;
    parse_token_response(&val, Utc::now())
        .ok_or_else(|| CredentialError::Token(format!("{source}: missing access_token")))
}

/// Accepts both AAD v2 (`expires_in`) and managed identity (`expires_on`) shapes
pub(crate) fn parse_token_response(val: &Value, now: DateTime<Utc>) -> Option<AccessToken> {
    let token = val.get("access_token")?.as_str()?.to_string();
    let expires_on = val
        .get("expires_on")
        .and_then(as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            val.get("expires_in")
                .and_then(as_i64)
                .map(|secs| now + chrono::Duration::seconds(secs))
        })
        .unwrap_or(now + chrono::Duration::hours(1));
    Some(AccessToken::new(token, expires_on))
}

fn as_i64(v: &Value) -> Option<i64> {
    v.as_i64()
        .or_else(|| v.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
}

/// Credential backed by the hosting platform's identity endpoint
pub struct ManagedIdentityCredential {
    http: Client,
    hints: PlatformIdentityHints,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    pub fn new(hints: PlatformIdentityHints) -> Result<Self> {
        if !hints.is_present() {
            return Err(CredentialError::Token(
                "no platform identity endpoint available".into(),
            ));
        }
        Ok(Self {
            http: http_client()?,
            hints,
            cache: TokenCache::new(),
        })
    }

    fn request(&self, resource: &str) -> RequestBuilder {
        let h = &self.hints;
        let mut query: Vec<(&str, &str)> = vec![("resource", resource)];
        if let Some(id) = h.client_id.as_deref() {
            query.push(("client_id", id));
        }
        match (
            h.identity_endpoint.as_deref(),
            h.identity_header.as_deref(),
            h.msi_endpoint.as_deref(),
        ) {
            (Some(endpoint), Some(header), _) => self
                .http
                .get(endpoint)
                .query(&[("api-version", "2019-08-01")])
                .query(&query)
                .header("X-IDENTITY-HEADER", header),
            (_, _, Some(endpoint)) => {
                let mut req = self
                    .http
                    .get(endpoint)
                    .query(&[("api-version", "2017-09-01")])
                    .query(&query);
                if let Some(secret) = h.msi_secret.as_deref() {
                    req = req.header("secret", secret);
                }
                req
            }
            _ => self
                .http
                .get(IMDS_ENDPOINT)
                .query(&[("api-version", "2018-02-01")])
                .query(&query)
                .header("Metadata", "true"),
        }
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        if let Some(hit) = self.cache.get(scopes) {
            return Ok(hit);
        }
        // The identity endpoints accept a single resource per request
        let scope = scopes
            .first()
            .ok_or_else(|| CredentialError::Token("no scope requested".into()))?;
        let resource = scope_to_resource(scope);
        debug!(target: "credentials", resource = %resource, "Requesting managed identity token");
        let token = fetch_token(self.request(&resource), "managed identity").await?;
        self.cache.insert(scopes, token.clone());
        Ok(token)
    }
}

/// Client credentials grant with a shared secret
pub struct ClientSecretCredential {
    http: Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    cache: TokenCache,
}

impl ClientSecretCredential {
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            token_url: token_url(authority_host, tenant_id),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            cache: TokenCache::new(),
        })
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        if let Some(hit) = self.cache.get(scopes) {
            return Ok(hit);
        }
        let scope = scopes.join(" ");
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];
        let token = fetch_token(self.http.post(&self.token_url).form(&form), "client secret").await?;
        self.cache.insert(scopes, token.clone());
        Ok(token)
    }
}

/// Client credentials grant authenticated with a certificate-signed client assertion
pub struct ClientCertificateCredential {
    http: Client,
    token_url: String,
    client_id: String,
    signer: AssertionSigner,
    cache: TokenCache,
}

impl ClientCertificateCredential {
    /// Accepts base64 PKCS#12 or PEM text, PKCS#12 bytes, or a path to a
    /// PKCS#12 file. The key must be RSA.
    pub fn new(
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        source: CertificateSource,
        password: Option<&str>,
    ) -> Result<Self> {
        let signer = match source {
            CertificateSource::Encoded(text) => AssertionSigner::from_text(&text, password)?,
            CertificateSource::Der(bytes) => AssertionSigner::from_pkcs12(&bytes, password)?,
            CertificateSource::Path(path) => {
                AssertionSigner::from_pkcs12(&read_file(&path)?, password)?
            }
        };
        Ok(Self {
            http: http_client()?,
            token_url: token_url(authority_host, tenant_id),
            client_id: client_id.to_string(),
            signer,
            cache: TokenCache::new(),
        })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).map_err(|e| {
        CredentialError::InvalidCertificate(format!("read {}: {e}", path.display()))
    })
}

#[async_trait]
impl TokenCredential for ClientCertificateCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        if let Some(hit) = self.cache.get(scopes) {
            return Ok(hit);
        }
        let scope = scopes.join(" ");
        let assertion = self.signer.sign(&self.client_id, &self.token_url)?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
            ("scope", scope.as_str()),
        ];
        let token = fetch_token(self.http.post(&self.token_url).form(&form), "client certificate").await?;
        self.cache.insert(scopes, token.clone());
        Ok(token)
    }
}

/// Developer machine credential: `AZURE_ACCESS_TOKEN`, then the Azure CLI session.
///
/// A token from the environment is bound to one audience
/// (`AZURE_ACCESS_TOKEN_SCOPE`, else the default scope) and only answers
/// requests for exactly that scope; every other scope goes to the CLI.
pub struct AmbientCredential {
    env_token: Option<String>,
    env_token_scope: String,
    cli_bin: String,
    tenant_id: Option<String>,
    cache: TokenCache,
}

impl AmbientCredential {
    pub fn new(tenant_id: Option<String>, default_scope: &str) -> Self {
        Self {
            env_token: env_opt("AZURE_ACCESS_TOKEN"),
            env_token_scope: env_opt("AZURE_ACCESS_TOKEN_SCOPE")
                .unwrap_or_else(|| default_scope.to_string()),
            cli_bin: env_opt("AZURE_CLI_BIN").unwrap_or_else(|| "az".to_string()),
            tenant_id,
            cache: TokenCache::new(),
        }
    }

    fn env_token_for(&self, scopes: &[String]) -> Option<&str> {
        match scopes {
            [only] if *only == self.env_token_scope => self.env_token.as_deref(),
            _ => None,
        }
    }

    async fn cli_token(&self, resource: &str) -> Result<AccessToken> {
        let mut cmd = tokio::process::Command::new(&self.cli_bin);
        cmd.args([
            "account",
            "get-access-token",
            "--output",
            "json",
            "--resource",
            resource,
        ]);
        if let Some(tenant) = &self.tenant_id {
            cmd.args(["--tenant", tenant]);
        }
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(Duration::from_millis(CLI_TIMEOUT_MS), cmd.output())
            .await
            .map_err(|_| CredentialError::Token("Azure CLI timed out".into()))?
            .map_err(|e| {
                CredentialError::Token(format!(
                    "Failed to execute '{}'. Is the Azure CLI installed? {e}",
                    self.cli_bin
                ))
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CredentialError::Token(format!(
                "Azure CLI error: {}",
                stderr.trim()
            )));
        }
        let val: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| CredentialError::Token(format!("Azure CLI returned invalid JSON: {e}")))?;
        parse_cli_token(&val)
            .ok_or_else(|| CredentialError::Token("Azure CLI output has no accessToken".into()))
    }
}

/// Newer CLIs emit `expires_on` (epoch seconds); older ones only local-time `expiresOn`
pub(crate) fn parse_cli_token(val: &Value) -> Option<AccessToken> {
    let token = val.get("accessToken")?.as_str()?.to_string();
    let expires_on = val
        .get("expires_on")
        .and_then(as_i64)
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .or_else(|| {
            let raw = val.get("expiresOn")?.as_str()?;
            let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
            Local
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc))
        })
        .unwrap_or_else(|| Utc::now() + chrono::Duration::hours(1));
    Some(AccessToken::new(token, expires_on))
}

#[async_trait]
impl TokenCredential for AmbientCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        if let Some(token) = self.env_token_for(scopes) {
            debug!(target: "credentials", "Using AZURE_ACCESS_TOKEN");
            return Ok(AccessToken::new(
                token,
                Utc::now() + chrono::Duration::hours(1),
            ));
        }
        if let Some(hit) = self.cache.get(scopes) {
            return Ok(hit);
        }
        let scope = scopes
            .first()
            .ok_or_else(|| CredentialError::Token("no scope requested".into()))?;
        let token = self.cli_token(&scope_to_resource(scope)).await?;
        self.cache.insert(scopes, token.clone());
        Ok(token)
    }
}
