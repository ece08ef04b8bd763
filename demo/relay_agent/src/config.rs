use std::fs;
use std::path::{Path, PathBuf};

use relay_core::{CredentialConfig, InferenceConfig};

/// Configuration for the relay demo
#[derive(Clone, Debug)]
pub struct RelayAgentConfig {
    pub credentials: CredentialConfig,
    pub inference: InferenceConfig,
    /// Authorize inference calls with resolver tokens instead of a static API key
    pub inference_uses_resolver: bool,
    /// Number of prior turns sent with each prompt
    pub history_turns: usize,
}

impl Default for RelayAgentConfig {
    fn default() -> Self {
        let inference = InferenceConfig::default();
        Self {
            credentials: CredentialConfig::from_env(),
            inference_uses_resolver: inference.api_key.is_none(),
            inference,
            history_turns: std::env::var("RELAY_HISTORY_TURNS")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(6),
        }
    }
}

impl RelayAgentConfig {
    /// Load configuration from a TOML file (path via RELAY_AGENT_CONFIG or ./relay_agent.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("RELAY_AGENT_CONFIG").unwrap_or_else(|_| "relay_agent.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "relay_agent", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<RelayAgentToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "relay_agent", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "relay_agent", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================
// Secrets (client secret, certificate password, API key) are env-only.

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct RelayAgentToml {
    pub history_turns: Option<usize>,
    pub credentials: Option<CredentialsToml>,
    pub inference: Option<InferenceToml>,
}

impl RelayAgentToml {
    fn overlay(self, mut base: RelayAgentConfig) -> RelayAgentConfig {
        if let Some(n) = self.history_turns {
            base.history_turns = n;
        }
        if let Some(c) = self.credentials {
            c.apply(&mut base.credentials);
        }
        if let Some(i) = self.inference {
            if let Some(x) = i.use_resolver {
                base.inference_uses_resolver = x;
            }
            i.apply(&mut base.inference);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct CredentialsToml {
    pub key_vault_uri: Option<String>,
    pub certificate_name: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub authority_host: Option<String>,
    pub default_scope: Option<String>,
    pub graph_enabled: Option<bool>,
    pub graph_base_url: Option<String>,
    pub graph_scope: Option<String>,
    pub ready_timeout_ms: Option<u64>,
    pub temp_dir: Option<PathBuf>,
}

impl CredentialsToml {
    fn apply(self, c: &mut CredentialConfig) {
        if let Some(x) = self.key_vault_uri {
            c.vault_uri = Some(x);
        }
        if let Some(x) = self.certificate_name {
            c.certificate_name = Some(x);
        }
        if let Some(x) = self.tenant_id {
            c.tenant_id = Some(x);
        }
        if let Some(x) = self.client_id {
            c.client_id = Some(x);
        }
        if let Some(x) = self.authority_host {
            c.authority_host = x;
        }
        if let Some(x) = self.default_scope {
            c.default_scope = x;
        }
        if let Some(x) = self.graph_base_url {
            c.graph_base_url = Some(x);
        }
        if self.graph_enabled == Some(false) {
            c.graph_base_url = None;
        }
        if let Some(x) = self.graph_scope {
            c.graph_scope = x;
        }
        if let Some(x) = self.ready_timeout_ms {
            c.ready_timeout_ms = x;
        }
        if let Some(x) = self.temp_dir {
            c.temp_dir = x;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct InferenceToml {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub scope: Option<String>,
    pub use_resolver: Option<bool>,
    pub request_timeout_ms: Option<u64>,
    pub temperature: Option<f32>,
    pub system_prompt: Option<String>,
}

impl InferenceToml {
    fn apply(self, i: &mut InferenceConfig) {
        if let Some(x) = self.endpoint {
            i.endpoint = x;
        }
        if let Some(x) = self.model {
            i.model = x;
        }
        if let Some(x) = self.scope {
            i.scope = x;
        }
        if let Some(x) = self.request_timeout_ms {
            i.request_timeout_ms = x;
        }
        if let Some(x) = self.temperature {
            i.temperature = x;
        }
        if let Some(x) = self.system_prompt {
            i.system_prompt = x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_replaces_only_given_fields() {
        let mut base = RelayAgentConfig::default();
        base.credentials = CredentialConfig::blank();
        base.inference.model = "env-model".into();

        let toml_src = r#"
            history_turns = 2

            [credentials]
            key_vault_uri = "https://relay.vault.azure.net"
            graph_enabled = false

            [inference]
            temperature = 0.1
            use_resolver = true
        "#;
        let overlay: RelayAgentToml = toml::from_str(toml_src).unwrap();
        let cfg = overlay.overlay(base);

        assert_eq!(cfg.history_turns, 2);
        assert_eq!(cfg.credentials.vault_uri.as_deref(), Some("https://relay.vault.azure.net"));
        assert!(cfg.credentials.graph_base_url.is_none());
        assert_eq!(cfg.inference.model, "env-model");
        assert!((cfg.inference.temperature - 0.1).abs() < f32::EPSILON);
        assert!(cfg.inference_uses_resolver);
    }
}
