//! Credential resolution and secrets access
//!
//! This module provides:
//! - `CredentialResolver`: tries platform identity, vault certificate, client
//!   secret and ambient developer credentials in that order and keeps the
//!   first one that can actually mint a token
//! - `ReadinessGate`: `Pending -> Succeeded | Failed` lifecycle that accessors
//!   wait on, bounded by a timeout
//! - secret, certificate, token and graph accessors built on the live credential
//! - `CredentialFactory` / `VaultConnector` seams for swapping the backends

mod assertion;
mod certificate;
mod error;
mod factory;
mod gate;
mod graph;
mod providers;
mod resolver;
mod strategy;
mod token;
mod vault;

pub use assertion::{AssertionSigner, CLIENT_ASSERTION_TYPE};
pub use certificate::{
    construct_certificate_credential, CertificateFormat, CertificateIdentity,
    CertificateMaterial, CertificateSource,
};
pub use error::{CredentialError, Result, SubClient};
pub use factory::{CredentialFactory, HttpCredentialFactory};
pub use gate::{ReadinessGate, ResolutionState};
pub use graph::GraphClient;
pub use providers::{
    AmbientCredential, ClientCertificateCredential, ClientSecretCredential,
    ManagedIdentityCredential,
};
pub use resolver::{ComponentStatus, CredentialResolver, HealthStatus, LiveCredential};
pub use strategy::{AttemptRecord, Strategy};
pub use token::{normalize_scopes, scope_to_resource, AccessToken, TokenCache, TokenCredential};
pub use vault::{
    CertificateClient, KeyVaultClient, KeyVaultConnector, SecretClient, VaultConnector,
    VAULT_SCOPE,
};
