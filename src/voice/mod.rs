//! Collaborator seams: transcription, reply generation, streaming synthesis

pub mod llm;
pub mod stt;
pub mod tts;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::Result;
use crate::protocol::ChatTurn;

/// Speech-to-text collaborator
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe WAV audio; an empty string means silence, not failure
    async fn transcribe(&self, wav: Vec<u8>, language: &str) -> Result<String>;
}

/// Conversational reply collaborator
#[async_trait]
pub trait Replier: Send + Sync {
    async fn reply(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
        locale: &str,
    ) -> Result<String>;
}

/// One event from an in-flight synthesis request
#[derive(Debug, Clone)]
pub enum SynthesisEvent {
    /// Decoded PCM audio chunk, in emission order
    Chunk(Vec<u8>),
    /// The request completed; no further events follow
    Done,
    /// The request failed; no further events follow
    Failed(String),
}

/// Handle to one outstanding synthesis request
pub struct SynthesisHandle {
    /// Opaque id correlating engine messages with this request
    pub request_id: String,
    pub events: mpsc::Receiver<SynthesisEvent>,
}

/// Streaming text-to-speech collaborator
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Start synthesizing `text`; chunks arrive on the returned handle
    async fn synthesize(&self, text: &str, locale: &str) -> Result<SynthesisHandle>;

    /// Drop the pending request; later engine messages for it are ignored
    async fn cancel(&self, request_id: &str);
}

/// Primary language subtag of a locale ("ko-KR" -> "ko")
#[must_use]
pub fn language_of(locale: &str) -> &str {
    locale
        .split(['-', '_'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("en")
}
