use std::sync::Arc;

use super::certificate::CertificateSource;
use super::error::Result;
use super::providers::{
    AmbientCredential, ClientCertificateCredential, ClientSecretCredential,
    ManagedIdentityCredential,
};
use super::token::TokenCredential;
use crate::config::PlatformIdentityHints;

/// Builds the credential object for each strategy.
///
/// Construction only validates inputs and wires clients; whether the result
/// actually works is decided by the resolver's liveness test.
pub trait CredentialFactory: Send + Sync {
    fn platform_identity(&self, hints: &PlatformIdentityHints)
        -> Result<Arc<dyn TokenCredential>>;

    fn certificate(
        &self,
        tenant_id: &str,
        client_id: &str,
        source: CertificateSource,
        password: Option<&str>,
    ) -> Result<Arc<dyn TokenCredential>>;

    fn client_secret(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Arc<dyn TokenCredential>>;

    fn ambient(&self, tenant_id: Option<&str>) -> Result<Arc<dyn TokenCredential>>;
}

/// Factory producing the real HTTP/CLI backed credentials
#[derive(Debug, Clone)]
pub struct HttpCredentialFactory {
    authority_host: String,
    /// Audience an `AZURE_ACCESS_TOKEN` is assumed to be issued for
    default_scope: String,
}

impl HttpCredentialFactory {
    pub fn new(authority_host: impl Into<String>, default_scope: impl Into<String>) -> Self {
        Self {
            authority_host: authority_host.into(),
            default_scope: default_scope.into(),
        }
    }
}

impl CredentialFactory for HttpCredentialFactory {
    fn platform_identity(
        &self,
        hints: &PlatformIdentityHints,
    ) -> Result<Arc<dyn TokenCredential>> {
        Ok(Arc::new(ManagedIdentityCredential::new(hints.clone())?))
    }

    fn certificate(
        &self,
        tenant_id: &str,
        client_id: &str,
        source: CertificateSource,
        password: Option<&str>,
    ) -> Result<Arc<dyn TokenCredential>> {
        Ok(Arc::new(ClientCertificateCredential::new(
            &self.authority_host,
            tenant_id,
            client_id,
            source,
            password,
        )?))
    }

    fn client_secret(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<Arc<dyn TokenCredential>> {
        Ok(Arc::new(ClientSecretCredential::new(
            &self.authority_host,
            tenant_id,
            client_id,
            client_secret,
        )?))
    }

    fn ambient(&self, tenant_id: Option<&str>) -> Result<Arc<dyn TokenCredential>> {
        Ok(Arc::new(AmbientCredential::new(
            tenant_id.map(str::to_string),
            &self.default_scope,
        )))
    }
}
