// Relay Core Library
// Credential resolution, secrets access and the chat relay pipeline

pub mod config;
pub mod credentials;
pub mod inference;
pub mod relay;
pub mod speech;
pub mod telemetry;

// Export core types
pub use config::{CredentialConfig, PlatformIdentityHints};
pub use credentials::{
    CertificateMaterial, CredentialError, CredentialResolver, HealthStatus, ResolutionState,
    Strategy,
};
pub use inference::{ChatMessage, Completion, InferenceClient, InferenceConfig, Role};
pub use relay::{Relay, RelayReply, UserInput, UNAVAILABLE_REPLY};
pub use speech::{AudioClip, Synthesizer, Transcriber};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Speech error: {0}")]
    Speech(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, RelayError>;
