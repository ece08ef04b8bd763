//! Secret and certificate sub-clients
//!
//! `KeyVaultClient` speaks the Key Vault REST API (`api-version=7.4`) with a
//! bearer token from whichever credential it was built with. Certificates are
//! read through the secret that backs them, which carries the PKCS#12 payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::certificate::CertificateMaterial;
use super::error::{CredentialError, Result};
use super::token::TokenCredential;

pub const VAULT_SCOPE: &str = "https://vault.azure.net/.default";
const API_VERSION: &str = "7.4";
const VAULT_TIMEOUT_MS: u64 = 15_000;
const PKCS12_CONTENT_TYPE: &str = "application/x-pkcs12";

#[async_trait]
pub trait SecretClient: Send + Sync {
    async fn get_secret(&self, name: &str) -> Result<String>;
    async fn set_secret(&self, name: &str, value: &str) -> Result<()>;
}

#[async_trait]
pub trait CertificateClient: Send + Sync {
    async fn get_certificate(&self, name: &str) -> Result<CertificateMaterial>;
}

/// Builds vault sub-clients bound to a credential
pub trait VaultConnector: Send + Sync {
    fn secret_client(
        &self,
        vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn SecretClient>>;

    fn certificate_client(
        &self,
        vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn CertificateClient>>;
}

#[derive(Debug, Clone, Default)]
pub struct KeyVaultConnector {
    /// Password for PKCS#12 payloads; the vault does not store one
    certificate_password: Option<String>,
}

impl KeyVaultConnector {
    pub fn new(certificate_password: Option<String>) -> Self {
        Self {
            certificate_password,
        }
    }
}

impl VaultConnector for KeyVaultConnector {
    fn secret_client(
        &self,
        vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn SecretClient>> {
        Ok(Arc::new(KeyVaultClient::new(
            vault_uri,
            credential,
            self.certificate_password.clone(),
        )?))
    }

    fn certificate_client(
        &self,
        vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn CertificateClient>> {
        Ok(Arc::new(KeyVaultClient::new(
            vault_uri,
            credential,
            self.certificate_password.clone(),
        )?))
    }
}

#[derive(Debug, Deserialize)]
struct SecretBundle {
    value: String,
    #[serde(rename = "contentType", default)]
    content_type: Option<String>,
}

#[derive(Serialize)]
struct SetSecretBody<'a> {
    value: &'a str,
}

pub struct KeyVaultClient {
    http: Client,
    vault_uri: String,
    credential: Arc<dyn TokenCredential>,
    certificate_password: Option<String>,
}

impl KeyVaultClient {
    pub fn new(
        vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
        certificate_password: Option<String>,
    ) -> Result<Self> {
        if !vault_uri.starts_with("https://") && !vault_uri.starts_with("http://") {
            return Err(CredentialError::Vault(format!(
                "vault URI must be an http(s) URL: {vault_uri}"
            )));
        }
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(VAULT_TIMEOUT_MS))
            .build()
            .map_err(|e| CredentialError::Vault(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            vault_uri: vault_uri.trim_end_matches('/').to_string(),
            credential,
            certificate_password,
        })
    }

    fn secret_url(&self, name: &str) -> String {
        format!("{}/secrets/{}", self.vault_uri, name)
    }

    async fn bearer(&self) -> Result<String> {
        let token = self.credential.get_token(&[VAULT_SCOPE.to_string()]).await?;
        Ok(token.token)
    }

    /// `None` when the vault answers 404
    async fn fetch_secret(&self, name: &str) -> Result<Option<SecretBundle>> {
        debug!(target: "vault", secret = %name, "GET secret");
        let resp = self
            .http
            .get(self.secret_url(name))
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(self.bearer().await?)
            .send()
            .await
            .map_err(|e| CredentialError::Vault(format!("HTTP error: {e}")))?;
        match resp.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => resp
                .json::<SecretBundle>()
                .await
                .map(Some)
                .map_err(|e| CredentialError::Vault(format!("invalid secret JSON: {e}"))),
            s => {
                let body = resp.text().await.unwrap_or_default();
                Err(CredentialError::Vault(format!("status={s} body={body}")))
            }
        }
    }
}

#[async_trait]
impl SecretClient for KeyVaultClient {
    async fn get_secret(&self, name: &str) -> Result<String> {
        self.fetch_secret(name)
            .await?
            .map(|b| b.value)
            .ok_or_else(|| CredentialError::SecretNotFound(name.to_string()))
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<()> {
        debug!(target: "vault", secret = %name, "PUT secret");
        let resp = self
            .http
            .put(self.secret_url(name))
            .query(&[("api-version", API_VERSION)])
            .bearer_auth(self.bearer().await?)
            .json(&SetSecretBody { value })
            .send()
            .await
            .map_err(|e| CredentialError::Vault(format!("HTTP error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CredentialError::Vault(format!(
                "set secret failed: status={status} body={body}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateClient for KeyVaultClient {
    async fn get_certificate(&self, name: &str) -> Result<CertificateMaterial> {
        let bundle = self
            .fetch_secret(name)
            .await?
            .ok_or_else(|| CredentialError::CertificateNotFound(name.to_string()))?;
        match bundle.content_type.as_deref() {
            None | Some(PKCS12_CONTENT_TYPE) => Ok(CertificateMaterial::pkcs12(
                bundle.value,
                self.certificate_password.clone(),
            )),
            Some(other) => Err(CredentialError::InvalidCertificate(format!(
                "certificate {name} has unsupported content type {other}"
            ))),
        }
    }
}
