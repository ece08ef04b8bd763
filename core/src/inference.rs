//! Inference endpoint client
//!
//! Talks to an OpenAI-compatible `chat/completions` endpoint. Requests are
//! authorized with a bearer token from the credential resolver when one is
//! attached, otherwise with the static API key if configured.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, error};

use crate::config::env_opt;
use crate::credentials::CredentialResolver;
use crate::{RelayError, Result};

pub const DEFAULT_INFERENCE_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Produces a reply for a prompt given the prior conversation
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str, context: &[ChatMessage]) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub endpoint: String, // e.g., https://my-resource.openai.azure.com/openai/v1
    pub model: String,
    /// Scope for resolver-issued tokens
    pub scope: String,
    pub api_key: Option<String>,
    pub request_timeout_ms: u64,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: env_opt("INFERENCE_ENDPOINT")
                .unwrap_or_else(|| "http://localhost:8000/v1".to_string()),
            model: env_opt("INFERENCE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            scope: env_opt("INFERENCE_SCOPE")
                .unwrap_or_else(|| DEFAULT_INFERENCE_SCOPE.to_string()),
            api_key: env_opt("INFERENCE_API_KEY"),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
            temperature: std::env::var("INFERENCE_TEMPERATURE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .unwrap_or(0.7),
            system_prompt: std::env::var("RELAY_SYSTEM_PROMPT").unwrap_or_else(|_| {
                "You are a helpful and concise assistant. Answer briefly and clearly.".into()
            }),
        }
    }
}

#[derive(Clone)]
pub struct InferenceClient {
    http: Client,
    cfg: InferenceConfig,
    resolver: Option<Arc<CredentialResolver>>,
}

impl InferenceClient {
    pub fn new(cfg: InferenceConfig, resolver: Option<Arc<CredentialResolver>>) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| RelayError::Inference(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, cfg, resolver })
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.cfg
    }

    async fn bearer(&self) -> Result<Option<String>> {
        if let Some(resolver) = &self.resolver {
            let token = resolver.get_access_token(&[self.cfg.scope.as_str()]).await?;
            return Ok(Some(token));
        }
        Ok(self.cfg.api_key.clone())
    }
}

#[async_trait]
impl Completion for InferenceClient {
    async fn complete(&self, prompt: &str, context: &[ChatMessage]) -> Result<String> {
        let mut messages = Vec::with_capacity(context.len() + 2);
        if !self.cfg.system_prompt.is_empty() {
            messages.push(ChatMessage::new(Role::System, self.cfg.system_prompt.clone()));
        }
        messages.extend_from_slice(context);
        messages.push(ChatMessage::new(Role::User, prompt));

        let url = format!(
            "{}/chat/completions",
            self.cfg.endpoint.trim_end_matches('/')
        );
        debug!(target: "inference", "POST {} via Chat Completions", url);

        let mut req = self
            .http
            .post(&url)
            .header("content-type", "application/json");
        if let Some(token) = self.bearer().await? {
            req = req.bearer_auth(token);
        }

        let body = json!({
            "model": self.cfg.model,
            "messages": messages,
            "temperature": self.cfg.temperature,
        });

        let resp = req
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Inference(format!("Chat Completions HTTP error: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            error!(target: "inference", %status, body = %text, "Chat Completions error");
            return Err(RelayError::Inference(format!(
                "Chat Completions error: status={} body={}",
                status, text
            )));
        }

        let val: serde_json::Value = resp.json().await.map_err(|e| {
            RelayError::Inference(format!("Failed to parse Chat Completions JSON: {e}"))
        })?;
        extract_text_from_chat_completions(&val).ok_or_else(|| {
            RelayError::Inference("Missing choices[0].message.content in chat completions".into())
        })
    }
}

fn extract_text_from_chat_completions(v: &serde_json::Value) -> Option<String> {
    v.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
