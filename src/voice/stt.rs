//! Whisper-style speech-to-text over HTTP multipart

use async_trait::async_trait;

use crate::config::SttConfig;
use crate::voice::Transcriber;
use crate::{Error, Result};

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Transcribes utterance audio via a Whisper-compatible endpoint
pub struct WhisperTranscriber {
    client: reqwest::Client,
    config: SttConfig,
}

impl WhisperTranscriber {
    #[must_use]
    pub fn new(config: SttConfig) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!("STT API key not configured; transcription calls will fail");
        }
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, wav: Vec<u8>, language: &str) -> Result<String> {
        tracing::debug!(audio_bytes = wav.len(), language, "starting transcription");

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(wav)
                    .file_name("utterance.wav")
                    .mime_str("audio/wav")
                    .map_err(|e| Error::Stt(e.to_string()))?,
            )
            .text("model", self.config.model.clone())
            .text("language", language.to_string());

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "transcription request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "transcription API error");
            return Err(Error::Stt(format!("transcription error {status}: {body}")));
        }

        let result: TranscriptionResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse transcription response");
            e
        })?;

        tracing::info!(transcript = %result.text, "transcription complete");
        Ok(result.text)
    }
}
