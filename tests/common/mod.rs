//! Shared mock collaborators for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};

use voicelink::voice::{SynthesisEvent, SynthesisHandle};
use voicelink::{
    ChatTurn, Replier, Result, SessionConfig, SessionDeps, SessionRegistry, Synthesizer,
    Transcriber, VoicePipeline, VoiceSettings,
};

/// Fast segmentation tunables so tests don't wait on real silence windows
pub fn test_settings() -> VoiceSettings {
    VoiceSettings {
        silence_window_ms: 50,
        min_utterance_ms: 10,
        input_sample_rate: 16_000,
        input_sample_width: 2,
    }
}

pub fn test_config(greeting: &str, history: Vec<ChatTurn>) -> SessionConfig {
    SessionConfig {
        system_prompt: "You are a concise fortune teller.".to_string(),
        locale: "ko-KR".to_string(),
        context_type: "reading".to_string(),
        greeting: greeting.to_string(),
        history,
    }
}

/// Transcriber that counts invocations and can simulate slowness
pub struct CountingTranscriber {
    pub calls: Arc<AtomicUsize>,
    pub delay: Duration,
    pub transcript: String,
}

#[async_trait]
impl Transcriber for CountingTranscriber {
    async fn transcribe(&self, _wav: Vec<u8>, _language: &str) -> Result<String> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.transcript.clone())
    }
}

/// Replier that echoes the user's text
pub struct EchoReplier;

#[async_trait]
impl Replier for EchoReplier {
    async fn reply(
        &self,
        _system_prompt: &str,
        _history: &[ChatTurn],
        user_text: &str,
        _locale: &str,
    ) -> Result<String> {
        Ok(format!("re: {user_text}"))
    }
}

/// How the mock synthesizer behaves per request
#[derive(Clone)]
pub enum SynthMode {
    /// Emit the given chunks then complete immediately
    Instant(Vec<Vec<u8>>),
    /// Emit one chunk then hold the stream open until canceled/aborted
    Stall,
    /// Emit chunks tagged with the request ordinal every 20 ms until the
    /// listener goes away
    Drip,
}

/// Synthesizer that records issued and canceled request ids
pub struct MockSynthesizer {
    pub mode: SynthMode,
    pub issued: Arc<Mutex<Vec<String>>>,
    pub canceled: Arc<Mutex<Vec<String>>>,
}

impl MockSynthesizer {
    pub fn new(mode: SynthMode) -> Self {
        Self {
            mode,
            issued: Arc::new(Mutex::new(Vec::new())),
            canceled: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn synthesize(&self, _text: &str, _locale: &str) -> Result<SynthesisHandle> {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.issued.lock().await.push(request_id.clone());
        let (tx, rx) = mpsc::channel(32);
        match &self.mode {
            SynthMode::Instant(chunks) => {
                for chunk in chunks {
                    tx.send(SynthesisEvent::Chunk(chunk.clone())).await.ok();
                }
                tx.send(SynthesisEvent::Done).await.ok();
            }
            SynthMode::Stall => {
                tx.send(SynthesisEvent::Chunk(vec![0u8; 8])).await.ok();
                // Keep the sender alive so the stream never completes
                tokio::spawn(async move {
                    let _tx = tx;
                    tokio::time::sleep(Duration::from_secs(60)).await;
                });
            }
            SynthMode::Drip => {
                let tag = u8::try_from(self.issued.lock().await.len()).unwrap_or(u8::MAX);
                tokio::spawn(async move {
                    loop {
                        if tx.send(SynthesisEvent::Chunk(vec![tag; 4])).await.is_err() {
                            break;
                        }
                        tokio::time::sleep(Duration::from_millis(20)).await;
                    }
                });
            }
        }
        Ok(SynthesisHandle { request_id, events: rx })
    }

    async fn cancel(&self, request_id: &str) {
        self.canceled.lock().await.push(request_id.to_string());
    }
}

/// Assemble deps around the given collaborators
pub fn deps(
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
) -> SessionDeps {
    let settings = test_settings();
    SessionDeps {
        pipeline: Arc::new(VoicePipeline::new(transcriber, Arc::new(EchoReplier), settings)),
        synthesizer,
        registry: SessionRegistry::new(),
        settings,
    }
}
