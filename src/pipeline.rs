//! Utterance pipeline: transcription, reply generation, speech sanitization
//!
//! One invocation per utterance. Silence (an empty transcript) is a normal
//! outcome; collaborator failures turn into a spoken apology so the voice
//! channel never goes quiet on error.

use std::io::Cursor;
use std::sync::Arc;

use crate::config::VoiceSettings;
use crate::protocol::ChatTurn;
use crate::sanitize;
use crate::voice::{Replier, Transcriber, language_of};
use crate::{Error, Result};

/// Result of one pipeline run; both fields may be empty on silence
#[derive(Debug, Clone, Default)]
pub struct TurnOutcome {
    pub transcript: String,
    pub reply: String,
}

/// Runs STT then reply generation for one utterance
pub struct VoicePipeline {
    transcriber: Arc<dyn Transcriber>,
    replier: Arc<dyn Replier>,
    settings: VoiceSettings,
}

impl VoicePipeline {
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        replier: Arc<dyn Replier>,
        settings: VoiceSettings,
    ) -> Self {
        Self {
            transcriber,
            replier,
            settings,
        }
    }

    /// Process one utterance's audio into a transcript and a spoken reply
    ///
    /// # Errors
    ///
    /// Returns an error only when the audio cannot be containerized;
    /// collaborator failures yield an apology reply instead.
    pub async fn run(
        &self,
        audio: &[u8],
        system_prompt: &str,
        history: &[ChatTurn],
        locale: &str,
    ) -> Result<TurnOutcome> {
        let wav = wrap_pcm_as_wav(audio, &self.settings)?;
        let language = language_of(locale);

        let transcript = match self.transcriber.transcribe(wav, language).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::error!(error = %e, "transcription failed");
                return Ok(TurnOutcome {
                    transcript: String::new(),
                    reply: apology(locale).to_string(),
                });
            }
        };

        // Silence is a normal outcome, not a failure
        if transcript.is_empty() {
            tracing::debug!("empty transcript, skipping reply generation");
            return Ok(TurnOutcome::default());
        }

        let reply = match self
            .replier
            .reply(system_prompt, history, &transcript, locale)
            .await
        {
            Ok(text) => sanitize::for_speech(&text),
            Err(e) => {
                tracing::error!(error = %e, "reply generation failed");
                apology(locale).to_string()
            }
        };

        Ok(TurnOutcome { transcript, reply })
    }
}

/// Prepend a WAV header so the transcriber accepts raw PCM
fn wrap_pcm_as_wav(pcm: &[u8], settings: &VoiceSettings) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: settings.input_sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::with_capacity(pcm.len() + 44));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| Error::Audio(e.to_string()))?;
        for sample in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([sample[0], sample[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }
        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }
    Ok(cursor.into_inner())
}

/// Short assistant turn priming the conversational role
#[must_use]
pub fn acknowledgment(locale: &str) -> &'static str {
    if language_of(locale) == "ko" {
        "네, 알겠습니다."
    } else {
        "Understood."
    }
}

/// Spoken fallback when a collaborator fails mid-turn
#[must_use]
pub fn apology(locale: &str) -> &'static str {
    if language_of(locale) == "ko" {
        "죄송해요, 잠시 문제가 생겼어요. 다시 한 번 말씀해 주시겠어요?"
    } else {
        "Sorry, something went wrong on my end. Could you say that again?"
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    struct FixedTranscriber(Result<&'static str>);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _wav: Vec<u8>, _language: &str) -> Result<String> {
            match &self.0 {
                Ok(text) => Ok((*text).to_string()),
                Err(_) => Err(Error::Stt("upstream 500".to_string())),
            }
        }
    }

    struct RecordingReplier {
        reply: Result<&'static str>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl Replier for RecordingReplier {
        async fn reply(
            &self,
            _system_prompt: &str,
            _history: &[ChatTurn],
            _user_text: &str,
            _locale: &str,
        ) -> Result<String> {
            *self.calls.lock().await += 1;
            match &self.reply {
                Ok(text) => Ok((*text).to_string()),
                Err(_) => Err(Error::Generation("upstream 500".to_string())),
            }
        }
    }

    fn pipeline(
        transcript: Result<&'static str>,
        reply: Result<&'static str>,
    ) -> (VoicePipeline, Arc<RecordingReplier>) {
        let replier = Arc::new(RecordingReplier {
            reply,
            calls: Mutex::new(0),
        });
        let pipeline = VoicePipeline::new(
            Arc::new(FixedTranscriber(transcript)),
            replier.clone(),
            VoiceSettings::default(),
        );
        (pipeline, replier)
    }

    #[tokio::test]
    async fn empty_transcript_short_circuits() {
        let (pipeline, replier) = pipeline(Ok("   "), Ok("unused"));
        let outcome = pipeline.run(&[0u8; 640], "prompt", &[], "ko-KR").await.unwrap();
        assert_eq!(outcome.transcript, "");
        assert_eq!(outcome.reply, "");
        assert_eq!(*replier.calls.lock().await, 0, "generator must not run on silence");
    }

    #[tokio::test]
    async fn reply_is_sanitized_for_speech() {
        let (pipeline, _) = pipeline(Ok("오늘 운세 알려줘"), Ok("**좋은 날이에요** ㅋㅋㅋ"));
        let outcome = pipeline.run(&[0u8; 640], "prompt", &[], "ko-KR").await.unwrap();
        assert_eq!(outcome.transcript, "오늘 운세 알려줘");
        assert_eq!(outcome.reply, "좋은 날이에요");
    }

    #[tokio::test]
    async fn stt_failure_yields_apology_not_error() {
        let (pipeline, replier) = pipeline(Err(Error::Stt(String::new())), Ok("unused"));
        let outcome = pipeline.run(&[0u8; 640], "prompt", &[], "ko-KR").await.unwrap();
        assert_eq!(outcome.transcript, "");
        assert_eq!(outcome.reply, apology("ko-KR"));
        assert_eq!(*replier.calls.lock().await, 0);
    }

    #[tokio::test]
    async fn generation_failure_yields_apology_with_transcript() {
        let (pipeline, _) = pipeline(Ok("hello"), Err(Error::Generation(String::new())));
        let outcome = pipeline.run(&[0u8; 640], "prompt", &[], "en-US").await.unwrap();
        assert_eq!(outcome.transcript, "hello");
        assert_eq!(outcome.reply, apology("en-US"));
    }

    #[test]
    fn wav_wrap_produces_riff_header() {
        let pcm = vec![0u8; 320];
        let wav = wrap_pcm_as_wav(&pcm, &VoiceSettings::default()).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert!(wav.len() > pcm.len());
    }

    #[test]
    fn locale_strings() {
        assert!(acknowledgment("ko-KR").contains("네"));
        assert_eq!(acknowledgment("en-US"), "Understood.");
        assert!(apology("ko-KR").contains("죄송"));
    }
}
