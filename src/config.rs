//! Configuration for the voicelink sidecar
//!
//! Credentials come from the environment; tunables have defaults matched to
//! the collaborator expectations (16 kHz mono s16le in, 44.1 kHz s16le out).

use std::env;

/// Sidecar configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Utterance segmentation and audio framing tunables
    pub voice: VoiceSettings,

    /// Transcription collaborator
    pub stt: SttConfig,

    /// Reply generation collaborator
    pub llm: LlmConfig,

    /// Streaming synthesis collaborator
    pub tts: TtsConfig,

    /// Session registry retention
    pub registry: RegistryConfig,
}

/// Utterance segmentation and audio framing tunables
#[derive(Debug, Clone, Copy)]
pub struct VoiceSettings {
    /// Quiet period after the last audio frame before an utterance is flushed
    pub silence_window_ms: u64,

    /// Utterances shorter than this are discarded as noise
    pub min_utterance_ms: u64,

    /// Input PCM sample rate (Hz)
    pub input_sample_rate: u32,

    /// Input PCM bytes per sample
    pub input_sample_width: u32,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            silence_window_ms: 500,
            min_utterance_ms: 300,
            input_sample_rate: 16_000,
            input_sample_width: 2,
        }
    }
}

impl VoiceSettings {
    /// Duration of a buffered utterance, computed from byte length
    #[must_use]
    pub fn buffered_duration_ms(&self, byte_len: usize) -> u64 {
        let bytes_per_sec = u64::from(self.input_sample_rate) * u64::from(self.input_sample_width);
        if bytes_per_sec == 0 {
            return 0;
        }
        byte_len as u64 * 1000 / bytes_per_sec
    }
}

/// Transcription collaborator configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
}

/// Reply generation collaborator configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub endpoint: String,
    pub model: String,
    pub max_tokens: u32,
}

/// Streaming synthesis collaborator configuration
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub api_key: String,
    pub ws_url: String,
    pub model_id: String,
    pub voice_id: String,
    /// Declared in every request; must match what the client plays back
    pub output_sample_rate: u32,
    /// Minimum engine-side buffering; the full text is known up front
    pub max_buffer_delay_ms: u64,
    pub max_reconnect_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

/// Session registry retention
#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    /// Entries older than this are purged even if never consumed
    pub retention_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retention_secs: 3600,
            sweep_interval_secs: 600,
        }
    }
}

impl Config {
    /// Load configuration from the environment
    #[must_use]
    pub fn from_env() -> Self {
        let openai_key = env::var("OPENAI_API_KEY").unwrap_or_default();

        Self {
            voice: VoiceSettings {
                silence_window_ms: env_u64("VOICELINK_SILENCE_MS", 500),
                min_utterance_ms: env_u64("VOICELINK_MIN_UTTERANCE_MS", 300),
                input_sample_rate: env_u32("VOICELINK_INPUT_SAMPLE_RATE", 16_000),
                input_sample_width: 2,
            },
            stt: SttConfig {
                api_key: env::var("VOICELINK_STT_API_KEY").unwrap_or_else(|_| openai_key.clone()),
                endpoint: env_str(
                    "VOICELINK_STT_URL",
                    "https://api.openai.com/v1/audio/transcriptions",
                ),
                model: env_str("VOICELINK_STT_MODEL", "whisper-1"),
            },
            llm: LlmConfig {
                api_key: env::var("VOICELINK_LLM_API_KEY").unwrap_or_else(|_| openai_key),
                endpoint: env_str(
                    "VOICELINK_LLM_URL",
                    "https://api.openai.com/v1/chat/completions",
                ),
                model: env_str("VOICELINK_LLM_MODEL", "gpt-4o-mini"),
                max_tokens: env_u32("VOICELINK_LLM_MAX_TOKENS", 512),
            },
            tts: TtsConfig {
                api_key: env::var("VOICELINK_TTS_API_KEY").unwrap_or_default(),
                ws_url: env_str("VOICELINK_TTS_WS_URL", "wss://api.cartesia.ai/tts/websocket"),
                model_id: env_str("VOICELINK_TTS_MODEL", "sonic-2"),
                voice_id: env::var("VOICELINK_TTS_VOICE").unwrap_or_default(),
                output_sample_rate: env_u32("VOICELINK_TTS_SAMPLE_RATE", 44_100),
                max_buffer_delay_ms: env_u64("VOICELINK_TTS_MAX_BUFFER_DELAY_MS", 0),
                max_reconnect_attempts: env_u32("VOICELINK_TTS_MAX_RECONNECTS", 5),
                backoff_base_ms: 500,
                backoff_cap_ms: 8_000,
            },
            registry: RegistryConfig {
                retention_secs: env_u64("VOICELINK_REGISTRY_RETENTION_SECS", 3600),
                sweep_interval_secs: env_u64("VOICELINK_REGISTRY_SWEEP_SECS", 600),
            },
        }
    }

    /// Names of required credentials that are not configured
    #[must_use]
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.stt.api_key.is_empty() {
            missing.push("stt_api_key");
        }
        if self.llm.api_key.is_empty() {
            missing.push("llm_api_key");
        }
        if self.tts.api_key.is_empty() {
            missing.push("tts_api_key");
        }
        missing
    }
}

fn env_str(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffered_duration_matches_16khz_s16le() {
        let settings = VoiceSettings::default();
        // 32 bytes per millisecond at 16 kHz / 16-bit mono
        assert_eq!(settings.buffered_duration_ms(32_000), 1000);
        assert_eq!(settings.buffered_duration_ms(9_600), 300);
        assert_eq!(settings.buffered_duration_ms(9_568), 299);
        assert_eq!(settings.buffered_duration_ms(0), 0);
    }

    #[test]
    fn default_tunables() {
        let settings = VoiceSettings::default();
        assert_eq!(settings.silence_window_ms, 500);
        assert_eq!(settings.min_utterance_ms, 300);
        let registry = RegistryConfig::default();
        assert_eq!(registry.retention_secs, 3600);
    }
}
