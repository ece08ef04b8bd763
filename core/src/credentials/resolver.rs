use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::certificate::{construct_certificate_credential, CertificateIdentity, CertificateMaterial};
use super::error::{CredentialError, Result, SubClient};
use super::factory::{CredentialFactory, HttpCredentialFactory};
use super::gate::{ReadinessGate, ResolutionState};
use super::graph::GraphClient;
use super::strategy::{AttemptRecord, Strategy};
use super::token::{normalize_scopes, TokenCredential};
use super::vault::{CertificateClient, KeyVaultConnector, SecretClient, VaultConnector};
use crate::config::CredentialConfig;

/// The credential that won the last resolution pass, with the sub-clients built from it.
/// Replaced as a whole on refresh; callers holding an `Arc` keep a consistent view.
pub struct LiveCredential {
    strategy: Strategy,
    credential: Arc<dyn TokenCredential>,
    secret_client: Option<Arc<dyn SecretClient>>,
    certificate_client: Option<Arc<dyn CertificateClient>>,
    graph: OnceCell<Arc<GraphClient>>,
}

impl LiveCredential {
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn credential(&self) -> Arc<dyn TokenCredential> {
        Arc::clone(&self.credential)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentStatus {
    #[serde(rename = "initialized")]
    Initialized,
    #[serde(rename = "not initialized")]
    NotInitialized,
    #[serde(rename = "configured")]
    Configured,
    #[serde(rename = "not configured")]
    NotConfigured,
}

/// Synchronous snapshot of the resolver, safe to take at any point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub credential: ComponentStatus,
    pub secret_client: ComponentStatus,
    pub certificate_client: ComponentStatus,
    pub graph_client: ComponentStatus,
    pub key_vault_uri: ComponentStatus,
    pub strategy: Option<Strategy>,
}

/// Resolves one working credential through the strategy chain and serves
/// secrets, certificates, tokens and the graph client on top of it.
///
/// Construct it once per process and hand out `Arc<CredentialResolver>`.
/// Construction does no I/O; call [`CredentialResolver::start`] to resolve in
/// the background, and every accessor waits on the readiness gate first.
pub struct CredentialResolver {
    config: CredentialConfig,
    factory: Arc<dyn CredentialFactory>,
    vault: Arc<dyn VaultConnector>,
    gate: ReadinessGate,
    live: RwLock<Option<Arc<LiveCredential>>>,
    attempts: RwLock<Vec<AttemptRecord>>,
    // one resolution pass at a time; the pass is the only writer of `live`
    resolution: Mutex<()>,
}

impl CredentialResolver {
    pub fn new(config: CredentialConfig) -> Self {
        let factory = Arc::new(HttpCredentialFactory::new(
            config.authority_host.clone(),
            config.default_scope.clone(),
        ));
        let vault = Arc::new(KeyVaultConnector::new(config.certificate_password.clone()));
        Self::with_backends(config, factory, vault)
    }

    pub fn with_backends(
        config: CredentialConfig,
        factory: Arc<dyn CredentialFactory>,
        vault: Arc<dyn VaultConnector>,
    ) -> Self {
        let gate = ReadinessGate::new(Duration::from_millis(config.ready_timeout_ms));
        Self {
            config,
            factory,
            vault,
            gate,
            live: RwLock::new(None),
            attempts: RwLock::new(Vec::new()),
            resolution: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &CredentialConfig {
        &self.config
    }

    /// Run the first resolution pass in the background.
    /// The outcome is observable through the gate; the task itself never fails.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let _ = this.initialize().await;
        })
    }

    /// Run a full resolution pass and publish its outcome on the gate.
    /// The returned error is the same one waiters will see.
    #[tracing::instrument(skip(self), name = "credential_resolution")]
    pub async fn initialize(&self) -> Result<()> {
        let _pass = self.resolution.lock().await;
        self.gate.begin();

        let (outcome, attempts) = self.run_chain().await;
        *self.attempts.write() = attempts.clone();

        match outcome {
            Some((strategy, credential)) => {
                let live = self.assemble(strategy, credential);
                *self.live.write() = Some(Arc::new(live));
                self.gate.succeed();
                info!(target: "credential_resolver", strategy = %strategy, failed_attempts = attempts.len(), "Credential resolved");
                Ok(())
            }
            None => {
                let err = CredentialError::AllStrategiesExhausted { attempts };
                *self.live.write() = None;
                error!(target: "credential_resolver", error = %err, "Credential resolution failed");
                self.gate.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Re-run the whole chain, replacing the live credential and the attempt log.
    /// Calls already in flight finish with the credential they captured.
    pub async fn refresh_credentials(&self) -> Result<()> {
        info!(target: "credential_resolver", "Refreshing credentials");
        self.initialize().await
    }

    /// Try strategies strictly in order; the first one that constructs and passes
    /// the liveness test wins. Returns the winner (if any) and the failed attempts.
    async fn run_chain(&self) -> (Option<(Strategy, Arc<dyn TokenCredential>)>, Vec<AttemptRecord>) {
        let mut attempts = Vec::new();
        for strategy in Strategy::ORDER {
            let Some(constructed) = self.construct(strategy).await else {
                debug!(target: "credential_resolver", strategy = %strategy, "Skipping strategy; prerequisites absent");
                continue;
            };
            info!(target: "credential_resolver", strategy = %strategy, "Trying credential strategy");
            let outcome = match constructed {
                Ok(credential) => self.liveness_test(&credential).await.map(|_| credential),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(credential) => return (Some((strategy, credential)), attempts),
                Err(e) => {
                    let failure = CredentialError::StrategyAttemptFailed {
                        strategy: strategy.name().to_string(),
                        message: e.to_string(),
                    };
                    warn!(target: "credential_resolver", error = %failure, "Credential strategy failed");
                    attempts.push(AttemptRecord::new(strategy, e.to_string()));
                }
            }
        }
        (None, attempts)
    }

    /// `None` means the strategy's configuration is absent and it is skipped
    async fn construct(&self, strategy: Strategy) -> Option<Result<Arc<dyn TokenCredential>>> {
        let cfg = &self.config;
        match strategy {
            Strategy::PlatformIdentity => {
                if !cfg.platform.is_present() {
                    return None;
                }
                Some(self.factory.platform_identity(&cfg.platform))
            }
            Strategy::Certificate => {
                if !cfg.has_certificate_config() {
                    return None;
                }
                Some(self.construct_from_vault_certificate().await)
            }
            Strategy::ClientSecret => match (&cfg.tenant_id, &cfg.client_id, &cfg.client_secret) {
                (Some(tenant), Some(client), Some(secret)) => {
                    Some(self.factory.client_secret(tenant, client, secret))
                }
                _ => None,
            },
            Strategy::AmbientDefault => Some(self.factory.ambient(cfg.tenant_id.as_deref())),
        }
    }

    async fn construct_from_vault_certificate(&self) -> Result<Arc<dyn TokenCredential>> {
        let cfg = &self.config;
        let (Some(vault_uri), Some(cert_name), Some(tenant_id), Some(client_id)) = (
            cfg.vault_uri.as_deref(),
            cfg.certificate_name.as_deref(),
            cfg.tenant_id.as_deref(),
            cfg.client_id.as_deref(),
        ) else {
            return Err(CredentialError::not_configured(SubClient::Certificate));
        };

        // The certificate has to be read before any app identity exists,
        // so the vault is reached with the developer/ambient identity.
        let bootstrap = self.factory.ambient(Some(tenant_id))?;
        let certificates = self.vault.certificate_client(vault_uri, bootstrap)?;
        let mut material: CertificateMaterial = certificates.get_certificate(cert_name).await?;
        if material.password.is_none() {
            material.password = cfg.certificate_password.clone();
        }

        let identity = CertificateIdentity {
            tenant_id,
            client_id,
        };
        construct_certificate_credential(
            self.factory.as_ref(),
            &identity,
            &material,
            &cfg.temp_dir,
        )
    }

    async fn liveness_test(&self, credential: &Arc<dyn TokenCredential>) -> Result<()> {
        credential
            .get_token(&[self.config.default_scope.clone()])
            .await
            .map(|_| ())
    }

    fn assemble(&self, strategy: Strategy, credential: Arc<dyn TokenCredential>) -> LiveCredential {
        let (secret_client, certificate_client) = match self.config.vault_uri.as_deref() {
            Some(uri) => (
                self.vault
                    .secret_client(uri, Arc::clone(&credential))
                    .map_err(|e| warn!(target: "credential_resolver", error = %e, "Secret client unavailable"))
                    .ok(),
                self.vault
                    .certificate_client(uri, Arc::clone(&credential))
                    .map_err(|e| warn!(target: "credential_resolver", error = %e, "Certificate client unavailable"))
                    .ok(),
            ),
            None => (None, None),
        };
        LiveCredential {
            strategy,
            credential,
            secret_client,
            certificate_client,
            graph: OnceCell::new(),
        }
    }

    /// Wait for readiness, then hand out the live credential captured at this moment
    async fn live(&self) -> Result<Arc<LiveCredential>> {
        loop {
            self.gate.ensure_ready().await?;
            // Succeeded always has a live credential; a refresh that started in
            // between flips the gate back to Pending and the next wait covers it.
            if let Some(live) = self.live.read().clone() {
                return Ok(live);
            }
        }
    }

    pub async fn ensure_ready(&self) -> Result<()> {
        self.gate.ensure_ready().await
    }

    pub async fn get_secret(&self, name: &str) -> Result<String> {
        let live = self.live().await?;
        let client = live
            .secret_client
            .as_ref()
            .ok_or_else(|| CredentialError::not_configured(SubClient::Secret))?;
        let value = client.get_secret(name).await?;
        Ok(value)
    }

    pub async fn set_secret(&self, name: &str, value: &str) -> Result<()> {
        let live = self.live().await?;
        let client = live
            .secret_client
            .as_ref()
            .ok_or_else(|| CredentialError::not_configured(SubClient::Secret))?;
        client.set_secret(name, value).await?;
        Ok(())
    }

    pub async fn get_certificate_info(&self, name: &str) -> Result<CertificateMaterial> {
        let live = self.live().await?;
        let client = live
            .certificate_client
            .as_ref()
            .ok_or_else(|| CredentialError::not_configured(SubClient::Certificate))?;
        let material = client.get_certificate(name).await?;
        Ok(material)
    }

    /// Bearer token for `scopes`; an empty list means the default scope
    pub async fn get_access_token(&self, scopes: &[&str]) -> Result<String> {
        let live = self.live().await?;
        let requested: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        let scopes = normalize_scopes(&requested, &self.config.default_scope);
        let token = live.credential.get_token(&scopes).await?;
        Ok(token.token)
    }

    /// Graph client for the live credential, built on first use and reused until refresh
    pub async fn get_graph_client(&self) -> Result<Arc<GraphClient>> {
        let live = self.live().await?;
        let base_url = self
            .config
            .graph_base_url
            .as_deref()
            .ok_or_else(|| CredentialError::not_configured(SubClient::Graph))?;
        let scope = self.config.graph_scope.as_str();
        let graph = live
            .graph
            .get_or_try_init(|| async {
                GraphClient::connect(base_url, scope, live.credential())
                    .await
                    .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(graph))
    }

    pub fn state(&self) -> ResolutionState {
        self.gate.state()
    }

    /// Failed attempts of the most recent resolution pass
    pub fn attempts(&self) -> Vec<AttemptRecord> {
        self.attempts.read().clone()
    }

    pub fn active_strategy(&self) -> Option<Strategy> {
        if !self.gate.is_ready() {
            return None;
        }
        self.live.read().as_ref().map(|l| l.strategy)
    }

    pub fn health_status(&self) -> HealthStatus {
        let ready = self.gate.is_ready();
        let live = if ready { self.live.read().clone() } else { None };
        let vault_configured = self.config.vault_uri.is_some();

        let sub_client = |present: bool| match (present, vault_configured) {
            (true, _) => ComponentStatus::Initialized,
            (false, true) => ComponentStatus::NotInitialized,
            (false, false) => ComponentStatus::NotConfigured,
        };

        let graph_client = match (&live, self.config.graph_base_url.is_some()) {
            (Some(l), _) if l.graph.initialized() => ComponentStatus::Initialized,
            (_, true) => ComponentStatus::Configured,
            (_, false) => ComponentStatus::NotConfigured,
        };

        HealthStatus {
            credential: if live.is_some() {
                ComponentStatus::Initialized
            } else {
                ComponentStatus::NotInitialized
            },
            secret_client: sub_client(live.as_ref().is_some_and(|l| l.secret_client.is_some())),
            certificate_client: sub_client(
                live.as_ref().is_some_and(|l| l.certificate_client.is_some()),
            ),
            graph_client,
            key_vault_uri: if vault_configured {
                ComponentStatus::Configured
            } else {
                ComponentStatus::NotConfigured
            },
            strategy: live.map(|l| l.strategy),
        }
    }
}
