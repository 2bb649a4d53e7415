//! Wire protocol for the client-facing voice WebSocket
//!
//! Text frames carry JSON messages tagged by `type`; binary frames are raw
//! PCM audio and are treated identically to the JSON `audio` message.

use serde::{Deserialize, Serialize};

/// One turn of conversation, as stored in history and sent in `ready`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Incoming WebSocket message from the client
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Fallback session setup when no registry entry was found at connect
    #[serde(rename_all = "camelCase")]
    Init {
        session_id: String,
        system_prompt: String,
        locale: String,
        #[serde(default)]
        context_type: String,
        #[serde(default)]
        greeting: String,
    },
    /// Base64-encoded PCM audio chunk
    Audio {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Informational end-of-speech hint; segmentation is timer-driven, so
    /// this is accepted and deliberately ignored
    Silence,
    /// Barge-in: cancel any in-flight reply and return to listening
    Interrupt,
    /// Terminate the session
    End,
}

/// Outgoing WebSocket message to the client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session established; `messages` carries any resumed history
    #[serde(rename_all = "camelCase")]
    Ready {
        session_id: String,
        messages: Vec<ChatTurn>,
    },
    Listening,
    Processing,
    Transcript {
        text: String,
    },
    Response {
        text: String,
    },
    Speaking,
    /// One chunk of synthesized reply audio
    TtsAudio {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    TtsDone,
    Interrupted,
    Ended,
    Error {
        error: String,
    },
}

/// Base64 (de)serialization for binary audio payloads
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded)
            .map_err(|e| serde::de::Error::custom(format!("invalid base64: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_deserializes_with_camel_case_fields() {
        let json = r#"{"type":"init","sessionId":"s1","systemPrompt":"be brief","locale":"ko-KR","contextType":"saju","greeting":"안녕하세요"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Init {
                session_id, locale, ..
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(locale, "ko-KR");
            }
            other => panic!("expected init, got {other:?}"),
        }
    }

    #[test]
    fn audio_roundtrips_base64() {
        let json = r#"{"type":"audio","data":"AQIDBA=="}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Audio { data } => assert_eq!(data, vec![1, 2, 3, 4]),
            other => panic!("expected audio, got {other:?}"),
        }
    }

    #[test]
    fn silence_interrupt_end_parse() {
        for raw in [
            r#"{"type":"silence"}"#,
            r#"{"type":"interrupt"}"#,
            r#"{"type":"end"}"#,
        ] {
            assert!(serde_json::from_str::<ClientMessage>(raw).is_ok(), "{raw}");
        }
    }

    #[test]
    fn ready_serializes_session_id_camel_case() {
        let msg = ServerMessage::Ready {
            session_id: "s1".to_string(),
            messages: vec![ChatTurn::assistant("hello")],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"ready\""));
        assert!(json.contains("\"sessionId\":\"s1\""));
        assert!(json.contains("\"role\":\"assistant\""));
    }

    #[test]
    fn tts_audio_encodes_base64() {
        let msg = ServerMessage::TtsAudio {
            data: vec![0xDE, 0xAD],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"tts_audio\""));
        assert!(json.contains("3q0="));
    }
}
