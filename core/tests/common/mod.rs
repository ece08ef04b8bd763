//! Fakes shared by the credential integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use relay_core::config::CredentialConfig;
use relay_core::credentials::{
    AccessToken, CertificateClient, CertificateMaterial, CertificateSource, CredentialError,
    CredentialFactory, Result, SecretClient, TokenCredential, VaultConnector,
};
use relay_core::PlatformIdentityHints;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How a fake strategy behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Works,
    ConstructFails,
    LivenessFails,
}

// Credential that returns "<name>-<generation>" tokens after an optional delay
pub struct FakeCredential {
    pub name: String,
    pub generation: usize,
    pub fail: bool,
    pub delay_ms: u64,
    /// Scopes this credential refuses even when otherwise healthy
    pub refused_scopes: Vec<String>,
    pub requested: Mutex<Vec<Vec<String>>>,
}

impl FakeCredential {
    pub fn new(name: &str, generation: usize, fail: bool, delay_ms: u64) -> Self {
        Self {
            name: name.to_string(),
            generation,
            fail,
            delay_ms,
            refused_scopes: Vec::new(),
            requested: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl TokenCredential for FakeCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        self.requested.lock().unwrap().push(scopes.to_vec());
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail || scopes.iter().any(|s| self.refused_scopes.contains(s)) {
            return Err(CredentialError::Token(format!("{} cannot mint tokens", self.name)));
        }
        Ok(AccessToken::new(
            format!("{}-{}", self.name, self.generation),
            Utc::now() + ChronoDuration::hours(1),
        ))
    }
}

pub struct FakeFactory {
    pub platform: Behavior,
    pub secret: Behavior,
    pub ambient: Behavior,
    /// Certificate shapes the constructor accepts ("string", "buffer", "file")
    pub accepted_cert_kinds: Vec<&'static str>,
    pub cert_liveness_fails: bool,
    pub liveness_delay_ms: u64,
    pub refused_scopes: Vec<String>,
    pub calls: Mutex<Vec<String>>,
    pub cert_sources: Mutex<Vec<CertificateSource>>,
    pub cert_paths_seen: Mutex<Vec<(PathBuf, bool)>>,
    pub generation: AtomicUsize,
    pub last_credential: Mutex<Option<Arc<FakeCredential>>>,
}

impl Default for FakeFactory {
    fn default() -> Self {
        Self {
            platform: Behavior::Works,
            secret: Behavior::Works,
            ambient: Behavior::Works,
            accepted_cert_kinds: vec!["string", "buffer", "file"],
            cert_liveness_fails: false,
            liveness_delay_ms: 0,
            refused_scopes: Vec::new(),
            calls: Mutex::new(Vec::new()),
            cert_sources: Mutex::new(Vec::new()),
            cert_paths_seen: Mutex::new(Vec::new()),
            generation: AtomicUsize::new(0),
            last_credential: Mutex::new(None),
        }
    }
}

impl FakeFactory {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cert_kinds(&self) -> Vec<&'static str> {
        self.cert_sources
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.kind())
            .collect()
    }

    fn build(&self, name: &str, behavior: Behavior) -> Result<Arc<dyn TokenCredential>> {
        self.calls.lock().unwrap().push(name.to_string());
        if behavior == Behavior::ConstructFails {
            return Err(CredentialError::Token(format!("{name} construction failed")));
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let mut cred = FakeCredential::new(
            name,
            generation,
            behavior == Behavior::LivenessFails,
            self.liveness_delay_ms,
        );
        cred.refused_scopes = self.refused_scopes.clone();
        let cred = Arc::new(cred);
        *self.last_credential.lock().unwrap() = Some(Arc::clone(&cred));
        Ok(cred)
    }
}

impl CredentialFactory for FakeFactory {
    fn platform_identity(&self, _hints: &PlatformIdentityHints) -> Result<Arc<dyn TokenCredential>> {
        self.build("platform", self.platform)
    }

    fn certificate(
        &self,
        _tenant_id: &str,
        _client_id: &str,
        source: CertificateSource,
        _password: Option<&str>,
    ) -> Result<Arc<dyn TokenCredential>> {
        let kind = source.kind();
        if let CertificateSource::Path(p) = &source {
            self.cert_paths_seen
                .lock()
                .unwrap()
                .push((p.clone(), p.exists()));
        }
        self.cert_sources.lock().unwrap().push(source);
        if !self.accepted_cert_kinds.contains(&kind) {
            self.calls.lock().unwrap().push(format!("certificate:{kind}"));
            return Err(CredentialError::InvalidCertificate(format!(
                "{kind} form not supported"
            )));
        }
        let behavior = if self.cert_liveness_fails {
            Behavior::LivenessFails
        } else {
            Behavior::Works
        };
        self.build(&format!("certificate:{kind}"), behavior)
    }

    fn client_secret(
        &self,
        _tenant_id: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<Arc<dyn TokenCredential>> {
        self.build("client_secret", self.secret)
    }

    fn ambient(&self, _tenant_id: Option<&str>) -> Result<Arc<dyn TokenCredential>> {
        self.build("ambient", self.ambient)
    }
}

/// In-memory vault shared by every client the connector hands out
#[derive(Default)]
pub struct FakeVault {
    pub secrets: Arc<Mutex<HashMap<String, String>>>,
    pub certificates: Arc<Mutex<HashMap<String, CertificateMaterial>>>,
    pub connects: AtomicUsize,
}

impl FakeVault {
    pub fn with_certificate(name: &str, material: CertificateMaterial) -> Self {
        let v = Self::default();
        v.certificates
            .lock()
            .unwrap()
            .insert(name.to_string(), material);
        v
    }
}

struct FakeVaultClient {
    secrets: Arc<Mutex<HashMap<String, String>>>,
    certificates: Arc<Mutex<HashMap<String, CertificateMaterial>>>,
    credential: Arc<dyn TokenCredential>,
}

#[async_trait]
impl SecretClient for FakeVaultClient {
    async fn get_secret(&self, name: &str) -> Result<String> {
        self.credential
            .get_token(&["https://vault.azure.net/.default".to_string()])
            .await?;
        self.secrets
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CredentialError::SecretNotFound(name.to_string()))
    }

    async fn set_secret(&self, name: &str, value: &str) -> Result<()> {
        self.secrets
            .lock()
            .unwrap()
            .insert(name.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl CertificateClient for FakeVaultClient {
    async fn get_certificate(&self, name: &str) -> Result<CertificateMaterial> {
        self.credential
            .get_token(&["https://vault.azure.net/.default".to_string()])
            .await?;
        self.certificates
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| CredentialError::CertificateNotFound(name.to_string()))
    }
}

impl VaultConnector for FakeVault {
    fn secret_client(
        &self,
        _vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn SecretClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeVaultClient {
            secrets: Arc::clone(&self.secrets),
            certificates: Arc::clone(&self.certificates),
            credential,
        }))
    }

    fn certificate_client(
        &self,
        _vault_uri: &str,
        credential: Arc<dyn TokenCredential>,
    ) -> Result<Arc<dyn CertificateClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FakeVaultClient {
            secrets: Arc::clone(&self.secrets),
            certificates: Arc::clone(&self.certificates),
            credential,
        }))
    }
}

pub fn client_secret_config() -> CredentialConfig {
    let mut cfg = CredentialConfig::blank();
    cfg.tenant_id = Some("tenant".into());
    cfg.client_id = Some("client".into());
    cfg.client_secret = Some("s3cret".into());
    cfg
}

pub fn certificate_config(temp_dir: PathBuf) -> CredentialConfig {
    let mut cfg = CredentialConfig::blank();
    cfg.vault_uri = Some("https://relay-test.vault.azure.net".into());
    cfg.certificate_name = Some("relay-cert".into());
    cfg.tenant_id = Some("tenant".into());
    cfg.client_id = Some("client".into());
    cfg.temp_dir = temp_dir;
    cfg
}

pub fn platform_hints() -> PlatformIdentityHints {
    PlatformIdentityHints {
        identity_endpoint: Some("http://localhost:42356/msi/token".into()),
        identity_header: Some("header".into()),
        ..Default::default()
    }
}

/// base64 of a few bytes standing in for a PKCS#12 blob
pub const FAKE_PFX_BASE64: &str = "MIIKaAIBAzCCCiQGCSqGSIb3DQEHAaCCChU=";
