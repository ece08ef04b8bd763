use async_trait::async_trait;
use relay_core::{
    AudioClip, ChatMessage, Completion, Relay, RelayError, RelayReply, Synthesizer, Transcriber,
    UserInput, UNAVAILABLE_REPLY,
};
use relay_core::credentials::CredentialError;
use std::sync::{Arc, Mutex};

// Echoes the prompt and records what it was given
#[derive(Default)]
struct EchoCompletion {
    seen: Mutex<Vec<(String, usize)>>,
}

#[async_trait]
impl Completion for EchoCompletion {
    async fn complete(&self, prompt: &str, context: &[ChatMessage]) -> relay_core::Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((prompt.to_string(), context.len()));
        Ok(format!("echo: {prompt}"))
    }
}

struct FailingCompletion;

#[async_trait]
impl Completion for FailingCompletion {
    async fn complete(&self, _: &str, _: &[ChatMessage]) -> relay_core::Result<String> {
        Err(RelayError::Credential(CredentialError::AllStrategiesExhausted {
            attempts: vec![],
        }))
    }
}

struct FixedTranscriber(&'static str);

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _: &AudioClip) -> relay_core::Result<String> {
        Ok(self.0.to_string())
    }
}

struct ToneSynth {
    fail: bool,
}

#[async_trait]
impl Synthesizer for ToneSynth {
    async fn synthesize(&self, text: &str) -> relay_core::Result<AudioClip> {
        if self.fail {
            return Err(RelayError::Speech("voice unavailable".into()));
        }
        Ok(AudioClip::new(text.as_bytes().to_vec(), "audio/wav"))
    }
}

fn wav() -> AudioClip {
    AudioClip::new(vec![0u8; 32], "audio/wav")
}

#[tokio::test]
async fn text_input_is_completed() {
    let completion = Arc::new(EchoCompletion::default());
    let relay = Relay::new(completion.clone());

    let reply = relay
        .handle(UserInput::Text("hello".into()), &[])
        .await;
    assert_eq!(reply.text, "echo: hello");
    assert!(!reply.degraded);
    assert!(reply.audio.is_none());
    assert_eq!(completion.seen.lock().unwrap()[0], ("hello".to_string(), 0));
}

#[tokio::test]
async fn speech_in_speech_out() {
    let relay = Relay::new(Arc::new(EchoCompletion::default()))
        .with_transcriber(Arc::new(FixedTranscriber("turn on the lights")))
        .with_synthesizer(Arc::new(ToneSynth { fail: false }));

    let reply = relay.handle(UserInput::Speech(wav()), &[]).await;
    assert_eq!(reply.text, "echo: turn on the lights");
    let audio = reply.audio.expect("synthesized reply");
    assert_eq!(audio.bytes, b"echo: turn on the lights".to_vec());
}

#[tokio::test]
async fn backend_failure_becomes_generic_reply() {
    let relay = Relay::new(Arc::new(FailingCompletion));
    let reply = relay.handle(UserInput::Text("hello".into()), &[]).await;

    assert_eq!(reply.text, UNAVAILABLE_REPLY);
    assert!(reply.degraded);
    // internal details never reach the user
    assert!(!reply.text.contains("strategies"));
}

#[tokio::test]
async fn speech_without_transcriber_degrades() {
    let relay = Relay::new(Arc::new(EchoCompletion::default()));
    let reply = relay.handle(UserInput::Speech(wav()), &[]).await;
    assert!(reply.degraded);
}

#[tokio::test]
async fn synthesis_failure_keeps_text_reply() {
    let relay = Relay::new(Arc::new(EchoCompletion::default()))
        .with_synthesizer(Arc::new(ToneSynth { fail: true }));
    let reply = relay.handle(UserInput::Text("hi".into()), &[]).await;
    assert_eq!(reply.text, "echo: hi");
    assert!(reply.audio.is_none());
    assert!(!reply.degraded);
}

#[tokio::test]
async fn blank_input_skips_completion() {
    let completion = Arc::new(EchoCompletion::default());
    let relay = Relay::new(completion.clone());
    let reply = relay.handle(UserInput::Text("   ".into()), &[]).await;
    assert_eq!(reply, RelayReply::default());
    assert!(completion.seen.lock().unwrap().is_empty());
}
