//! Voicelink - real-time voice conversation sidecar
//!
//! Accepts streamed microphone audio over a WebSocket, segments utterances
//! by silence, runs them through transcription and reply generation, and
//! streams synthesized speech back, with barge-in interruption and session
//! resumption.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Client                          │
//! │        audio frames ⇄ events / tts_audio             │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ WebSocket
//! ┌────────────────────▼─────────────────────────────────┐
//! │               Session Coordinator                    │
//! │   buffer │ silence timer │ history │ interrupt       │
//! └──────┬──────────────┬──────────────────┬─────────────┘
//!        │              │                  │
//! ┌──────▼─────┐ ┌──────▼──────┐ ┌─────────▼────────────┐
//! │    STT     │ │     LLM     │ │  Streaming TTS       │
//! │ (multipart)│ │ (chat API)  │ │ (persistent socket)  │
//! └────────────┘ └─────────────┘ └──────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod sanitize;
pub mod voice;

pub use config::{Config, VoiceSettings};
pub use coordinator::{SessionCommand, SessionConfig, SessionCoordinator, SessionDeps};
pub use error::{Error, Result};
pub use pipeline::{TurnOutcome, VoicePipeline};
pub use protocol::{ChatTurn, ClientMessage, Role, ServerMessage};
pub use registry::{RegisteredSession, SessionRegistry};
pub use voice::{Replier, SynthesisEvent, SynthesisHandle, Synthesizer, Transcriber};
