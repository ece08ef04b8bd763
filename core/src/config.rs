//! Credential configuration loaded from environment variables
//!
//! Every optional value treats an empty string as unset, so a blank
//! `AZURE_CLIENT_SECRET=` in a `.env` file does not make a strategy applicable.

use std::path::PathBuf;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_SCOPE: &str = "https://management.azure.com/.default";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
pub const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;

/// Signals that the process runs inside the hosting platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformIdentityHints {
    /// App Service style endpoint (`IDENTITY_ENDPOINT` + `IDENTITY_HEADER`)
    pub identity_endpoint: Option<String>,
    pub identity_header: Option<String>,
    /// Legacy endpoint (`MSI_ENDPOINT` + `MSI_SECRET`)
    pub msi_endpoint: Option<String>,
    pub msi_secret: Option<String>,
    /// Opt-in to the instance metadata service when no endpoint is injected
    pub use_imds: bool,
    /// User-assigned identity; system-assigned when absent
    pub client_id: Option<String>,
}

impl PlatformIdentityHints {
    pub fn from_env() -> Self {
        Self {
            identity_endpoint: env_opt("IDENTITY_ENDPOINT"),
            identity_header: env_opt("IDENTITY_HEADER"),
            msi_endpoint: env_opt("MSI_ENDPOINT"),
            msi_secret: env_opt("MSI_SECRET"),
            use_imds: env_flag("AZURE_USE_MANAGED_IDENTITY"),
            client_id: env_opt("AZURE_MANAGED_IDENTITY_CLIENT_ID"),
        }
    }

    pub fn is_present(&self) -> bool {
        self.identity_endpoint.is_some() || self.msi_endpoint.is_some() || self.use_imds
    }
}

#[derive(Debug, Clone)]
pub struct CredentialConfig {
    pub vault_uri: Option<String>,
    pub certificate_name: Option<String>,
    pub certificate_password: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub platform: PlatformIdentityHints,
    pub authority_host: String,
    /// Scope used for liveness tests and scope-less token requests
    pub default_scope: String,
    /// `None` when graph access is switched off (`GRAPH_ENABLED=false`)
    pub graph_base_url: Option<String>,
    pub graph_scope: String,
    /// Upper bound for `ensure_ready` waits
    pub ready_timeout_ms: u64,
    /// Where the certificate file fallback writes its short-lived file
    pub temp_dir: PathBuf,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            vault_uri: env_opt("AZURE_KEY_VAULT_URI").or_else(|| env_opt("KEY_VAULT_URI")),
            certificate_name: env_opt("AZURE_CERTIFICATE_NAME"),
            certificate_password: env_opt("AZURE_CERTIFICATE_PASSWORD"),
            tenant_id: env_opt("AZURE_TENANT_ID"),
            client_id: env_opt("AZURE_CLIENT_ID"),
            client_secret: env_opt("AZURE_CLIENT_SECRET"),
            platform: PlatformIdentityHints::from_env(),
            authority_host: env_opt("AZURE_AUTHORITY_HOST")
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            default_scope: env_opt("CREDENTIAL_DEFAULT_SCOPE")
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
            graph_base_url: if env_opt("GRAPH_ENABLED").map_or(true, |v| is_truthy(&v)) {
                Some(
                    env_opt("GRAPH_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
                )
            } else {
                None
            },
            graph_scope: env_opt("GRAPH_SCOPE").unwrap_or_else(|| DEFAULT_GRAPH_SCOPE.to_string()),
            ready_timeout_ms: std::env::var("CREDENTIAL_READY_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_READY_TIMEOUT_MS),
            temp_dir: env_opt("CREDENTIAL_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
        }
    }
}

impl CredentialConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Configuration with nothing set; defaults only, no environment lookups
    pub fn blank() -> Self {
        Self {
            vault_uri: None,
            certificate_name: None,
            certificate_password: None,
            tenant_id: None,
            client_id: None,
            client_secret: None,
            platform: PlatformIdentityHints::default(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            default_scope: DEFAULT_SCOPE.to_string(),
            graph_base_url: Some(DEFAULT_GRAPH_BASE_URL.to_string()),
            graph_scope: DEFAULT_GRAPH_SCOPE.to_string(),
            ready_timeout_ms: DEFAULT_READY_TIMEOUT_MS,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Vault URI, certificate name, tenant id and client id are all required
    pub fn has_certificate_config(&self) -> bool {
        self.vault_uri.is_some()
            && self.certificate_name.is_some()
            && self.tenant_id.is_some()
            && self.client_id.is_some()
    }
}

pub(crate) fn env_opt(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_flag(name: &str) -> bool {
    env_opt(name).map(|v| is_truthy(&v)).unwrap_or(false)
}

fn is_truthy(v: &str) -> bool {
    matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
