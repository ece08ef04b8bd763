use serde::{Deserialize, Serialize};

/// Authentication strategies, in the fixed order the resolver tries them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Identity assigned by the hosting platform (managed identity)
    PlatformIdentity,
    /// Client certificate fetched from the vault
    Certificate,
    /// Tenant + client id + client secret
    ClientSecret,
    /// Whatever the developer machine offers (env token, CLI session)
    AmbientDefault,
}

impl Strategy {
    pub const ORDER: [Strategy; 4] = [
        Strategy::PlatformIdentity,
        Strategy::Certificate,
        Strategy::ClientSecret,
        Strategy::AmbientDefault,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::PlatformIdentity => "platform_identity",
            Strategy::Certificate => "certificate",
            Strategy::ClientSecret => "client_secret",
            Strategy::AmbientDefault => "ambient_default",
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One failed strategy attempt. Skipped strategies never produce a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub strategy: String,
    pub message: String,
}

impl AttemptRecord {
    pub fn new(strategy: Strategy, message: impl Into<String>) -> Self {
        Self {
            strategy: strategy.name().to_string(),
            message: message.into(),
        }
    }
}
