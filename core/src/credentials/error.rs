use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::strategy::AttemptRecord;

/// Sub-clients that are only built when their configuration is present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubClient {
    Secret,
    Certificate,
    Graph,
}

impl std::fmt::Display for SubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SubClient::Secret => "secret client",
            SubClient::Certificate => "certificate client",
            SubClient::Graph => "graph client",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CredentialError {
    /// One strategy failed to construct or failed its liveness test.
    /// Only ever recorded inside the resolver, never returned alone.
    #[error("{strategy} failed: {message}")]
    StrategyAttemptFailed { strategy: String, message: String },

    #[error("all credential strategies failed: {}", format_attempts(.attempts))]
    AllStrategiesExhausted { attempts: Vec<AttemptRecord> },

    #[error("credential initialization did not finish within {waited_ms}ms")]
    InitTimeout { waited_ms: u64 },

    #[error("{client} is not configured")]
    NotConfigured { client: SubClient },

    #[error("graph client is not configured: {0}")]
    GraphNotConfigured(String),

    #[error("secret not found: {0}")]
    SecretNotFound(String),

    #[error("certificate not found: {0}")]
    CertificateNotFound(String),

    #[error("graph request failed: {0}")]
    Graph(String),

    #[error("vault error: {0}")]
    Vault(String),

    #[error("token request failed: {0}")]
    Token(String),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),
}

impl CredentialError {
    pub fn not_configured(client: SubClient) -> Self {
        Self::NotConfigured { client }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::SecretNotFound(_) | Self::CertificateNotFound(_)
        )
    }
}

fn format_attempts(attempts: &[AttemptRecord]) -> String {
    if attempts.is_empty() {
        return "no strategy was applicable".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("[{}] {}", a.strategy, a.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, CredentialError>;
