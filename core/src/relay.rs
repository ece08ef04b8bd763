use std::sync::Arc;

use tracing::{error, info, warn};

use crate::inference::{ChatMessage, Completion};
use crate::speech::{AudioClip, Synthesizer, Transcriber};
use crate::{RelayError, Result};

/// What end users see when anything behind the relay fails
pub const UNAVAILABLE_REPLY: &str =
    "The service is temporarily unavailable. Please try again later.";

#[derive(Debug, Clone)]
pub enum UserInput {
    Text(String),
    Speech(AudioClip),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReply {
    pub text: String,
    pub audio: Option<AudioClip>,
    /// True when `text` is the generic unavailable message
    pub degraded: bool,
}

impl RelayReply {
    fn unavailable() -> Self {
        Self {
            text: UNAVAILABLE_REPLY.to_string(),
            audio: None,
            degraded: true,
        }
    }
}

/// Input -> (transcribe) -> complete -> (synthesize)
pub struct Relay {
    completion: Arc<dyn Completion>,
    transcriber: Option<Arc<dyn Transcriber>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
}

impl Relay {
    pub fn new(completion: Arc<dyn Completion>) -> Self {
        Self {
            completion,
            transcriber: None,
            synthesizer: None,
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = Some(transcriber);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Never fails: errors are logged in full and replaced by the generic reply.
    /// Empty input yields an empty reply.
    pub async fn handle(&self, input: UserInput, context: &[ChatMessage]) -> RelayReply {
        match self.try_handle(input, context).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(target: "relay", error = %e, "Relay request failed");
                RelayReply::unavailable()
            }
        }
    }

    async fn try_handle(&self, input: UserInput, context: &[ChatMessage]) -> Result<RelayReply> {
        let text = match input {
            UserInput::Text(t) => t,
            UserInput::Speech(clip) => {
                let transcriber = self.transcriber.as_ref().ok_or_else(|| {
                    RelayError::Speech("speech input received but no transcriber configured".into())
                })?;
                let transcript = transcriber.transcribe(&clip).await?;
                transcript
            }
        };
        if text.trim().is_empty() {
            return Ok(RelayReply::default());
        }
        info!(target: "relay", user_query = %text, "Relaying user input");

        let reply = self.completion.complete(&text, context).await?;

        let audio = match &self.synthesizer {
            Some(synth) if !reply.is_empty() => match synth.synthesize(&reply).await {
                Ok(clip) => Some(clip),
                Err(e) => {
                    warn!(target: "relay", error = %e, "Speech synthesis failed; replying with text only");
                    None
                }
            },
            _ => None,
        };

        Ok(RelayReply {
            text: reply,
            audio,
            degraded: false,
        })
    }
}
