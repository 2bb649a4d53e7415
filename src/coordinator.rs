//! Per-connection session state machine
//!
//! Each socket gets one coordinator task. It owns the audio buffer, the
//! silence timer, the conversation history, and the processing flag that
//! guarantees at most one pipeline run in flight per session. Client frames
//! arrive as commands; timer fires and pipeline completions arrive on an
//! internal channel consumed by the same loop, so state is never shared.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;

use crate::config::VoiceSettings;
use crate::pipeline::{TurnOutcome, VoicePipeline};
use crate::protocol::{ChatTurn, ClientMessage, ServerMessage};
use crate::registry::{RegisteredSession, SessionRegistry};
use crate::voice::{SynthesisEvent, Synthesizer};
use crate::Result;

/// Negotiated configuration for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub system_prompt: String,
    pub locale: String,
    pub context_type: String,
    pub greeting: String,
    /// Prior conversation when resuming
    pub history: Vec<ChatTurn>,
}

impl From<RegisteredSession> for SessionConfig {
    fn from(entry: RegisteredSession) -> Self {
        Self {
            system_prompt: entry.system_prompt,
            locale: entry.locale,
            context_type: entry.context_type,
            greeting: entry.greeting,
            history: entry.messages,
        }
    }
}

/// Shared collaborators handed to every coordinator
#[derive(Clone)]
pub struct SessionDeps {
    pub pipeline: Arc<VoicePipeline>,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub registry: SessionRegistry,
    pub settings: VoiceSettings,
}

/// Input to a coordinator task
#[derive(Debug)]
pub enum SessionCommand {
    /// Parsed JSON frame from the client
    Client(ClientMessage),
    /// Raw binary frame, equivalent to an `audio` message
    BinaryAudio(Vec<u8>),
    /// The socket went away without an explicit end
    Closed,
}

/// Loop-internal events: timer fires, pipeline and synthesis completions
enum Internal {
    SilenceElapsed(u64),
    TurnFinished(Result<TurnOutcome>),
    SpeakingFinished(String),
}

/// Per-session state machine
pub struct SessionCoordinator {
    session_id: String,
    config: Option<SessionConfig>,
    history: Vec<ChatTurn>,
    buffer: Vec<u8>,
    is_processing: bool,
    timer_generation: u64,
    silence_timer: Option<JoinHandle<()>>,
    current_request: Option<String>,
    speaking_task: Option<JoinHandle<()>>,
    deps: SessionDeps,
    out: mpsc::Sender<ServerMessage>,
    internal_tx: mpsc::Sender<Internal>,
}

impl SessionCoordinator {
    /// Spawn the coordinator task for one connection
    pub fn spawn(
        session_id: String,
        config: Option<SessionConfig>,
        deps: SessionDeps,
        out: mpsc::Sender<ServerMessage>,
    ) -> (mpsc::Sender<SessionCommand>, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (coordinator, internal_rx) = Self::build(session_id, config, deps, out);
        let task = tokio::spawn(coordinator.run(command_rx, internal_rx));
        (command_tx, task)
    }

    fn build(
        session_id: String,
        config: Option<SessionConfig>,
        deps: SessionDeps,
        out: mpsc::Sender<ServerMessage>,
    ) -> (Self, mpsc::Receiver<Internal>) {
        let (internal_tx, internal_rx) = mpsc::channel(64);
        let history = config.as_ref().map(|c| c.history.clone()).unwrap_or_default();
        let coordinator = Self {
            session_id,
            config,
            history,
            buffer: Vec::new(),
            is_processing: false,
            timer_generation: 0,
            silence_timer: None,
            current_request: None,
            speaking_task: None,
            deps,
            out,
            internal_tx,
        };
        (coordinator, internal_rx)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut internal: mpsc::Receiver<Internal>,
    ) {
        if self.config.is_some() {
            self.start_session().await;
        } else {
            tracing::warn!(
                session = %self.session_id,
                "no registered config; waiting for init message"
            );
        }

        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => {
                            self.shutdown().await;
                            break;
                        }
                    }
                }
                Some(event) = internal.recv() => {
                    self.handle_internal(event).await;
                }
            }
        }
        tracing::debug!(session = %self.session_id, "coordinator stopped");
    }

    /// Handle one client command; returns false when the session is over
    async fn handle_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Client(message) => match message {
                ClientMessage::Init {
                    session_id,
                    system_prompt,
                    locale,
                    context_type,
                    greeting,
                } => {
                    if self.config.is_some() {
                        tracing::debug!(session = %self.session_id, "ignoring duplicate init");
                        return true;
                    }
                    if session_id != self.session_id {
                        tracing::warn!(
                            session = %self.session_id,
                            init_session = %session_id,
                            "init carries a different session id; keeping the socket's"
                        );
                    }
                    self.config = Some(SessionConfig {
                        system_prompt,
                        locale,
                        context_type,
                        greeting,
                        history: Vec::new(),
                    });
                    self.start_session().await;
                }
                ClientMessage::Audio { data } => self.push_audio(data),
                // Deliberate no-op: segmentation is driven by the silence
                // timer, not by this hint
                ClientMessage::Silence => {}
                ClientMessage::Interrupt => self.interrupt().await,
                ClientMessage::End => {
                    self.shutdown().await;
                    self.emit(ServerMessage::Ended).await;
                    return false;
                }
            },
            SessionCommand::BinaryAudio(data) => self.push_audio(data),
            SessionCommand::Closed => {
                self.shutdown().await;
                return false;
            }
        }
        true
    }

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::SilenceElapsed(generation) => self.on_silence(generation).await,
            Internal::TurnFinished(outcome) => self.on_turn_finished(outcome).await,
            Internal::SpeakingFinished(request_id) => {
                if self.current_request.as_deref() == Some(request_id.as_str()) {
                    self.current_request = None;
                    self.speaking_task = None;
                    self.is_processing = false;
                    self.emit(ServerMessage::Listening).await;
                }
            }
        }
    }

    async fn start_session(&mut self) {
        let Some(config) = self.config.clone() else { return };
        self.history = config.history.clone();
        self.emit(ServerMessage::Ready {
            session_id: self.session_id.clone(),
            messages: self.history.clone(),
        })
        .await;
        tracing::info!(
            session = %self.session_id,
            locale = %config.locale,
            context = %config.context_type,
            resumed_turns = self.history.len(),
            "session started"
        );

        // A resumed conversation gets no greeting
        if self.history.is_empty() && !config.greeting.is_empty() {
            self.history.push(ChatTurn::assistant(config.greeting.clone()));
            self.start_speaking(&config.greeting, &config.locale).await;
        } else {
            self.emit(ServerMessage::Listening).await;
        }
    }

    /// Buffer a frame and re-arm the silence timer
    fn push_audio(&mut self, data: Vec<u8>) {
        if self.config.is_none() {
            tracing::warn!(session = %self.session_id, "audio before init, dropping");
            return;
        }
        self.buffer.extend_from_slice(&data);

        self.timer_generation += 1;
        let generation = self.timer_generation;
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        let window = Duration::from_millis(self.deps.settings.silence_window_ms);
        let internal_tx = self.internal_tx.clone();
        self.silence_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let _ = internal_tx.send(Internal::SilenceElapsed(generation)).await;
        }));
    }

    async fn on_silence(&mut self, generation: u64) {
        if generation != self.timer_generation {
            return;
        }
        let Some(config) = self.config.clone() else { return };
        if self.buffer.is_empty() || self.is_processing {
            return;
        }

        let duration_ms = self.deps.settings.buffered_duration_ms(self.buffer.len());
        if duration_ms < self.deps.settings.min_utterance_ms {
            tracing::debug!(
                session = %self.session_id,
                duration_ms,
                "utterance below minimum, discarding as noise"
            );
            self.buffer.clear();
            return;
        }

        self.is_processing = true;
        self.emit(ServerMessage::Processing).await;

        let audio = std::mem::take(&mut self.buffer);
        let pipeline = self.deps.pipeline.clone();
        let system_prompt = config.system_prompt.clone();
        let locale = config.locale.clone();
        let history = self.history.clone();
        let internal_tx = self.internal_tx.clone();
        tracing::debug!(session = %self.session_id, bytes = audio.len(), duration_ms, "utterance flushed");
        tokio::spawn(async move {
            let outcome = pipeline.run(&audio, &system_prompt, &history, &locale).await;
            let _ = internal_tx.send(Internal::TurnFinished(outcome)).await;
        });
    }

    async fn on_turn_finished(&mut self, outcome: Result<TurnOutcome>) {
        let locale = self
            .config
            .as_ref()
            .map(|c| c.locale.clone())
            .unwrap_or_default();
        match outcome {
            Ok(turn) => {
                if !turn.transcript.is_empty() {
                    self.emit(ServerMessage::Transcript {
                        text: turn.transcript.clone(),
                    })
                    .await;
                    self.history.push(ChatTurn::user(turn.transcript));
                }
                if turn.reply.is_empty() {
                    self.is_processing = false;
                    self.emit(ServerMessage::Listening).await;
                } else {
                    self.emit(ServerMessage::Response {
                        text: turn.reply.clone(),
                    })
                    .await;
                    self.history.push(ChatTurn::assistant(turn.reply.clone()));
                    self.start_speaking(&turn.reply, &locale).await;
                }
            }
            Err(e) => {
                tracing::error!(session = %self.session_id, error = %e, "pipeline failed");
                self.emit(ServerMessage::Error {
                    error: e.to_string(),
                })
                .await;
                self.is_processing = false;
                self.emit(ServerMessage::Listening).await;
            }
        }
    }

    /// Stream one reply through the synthesizer to the client
    async fn start_speaking(&mut self, text: &str, locale: &str) {
        // A reply can start while the greeting is still streaming; only one
        // synthesis request is current at a time, so the old stream is torn
        // down before the new one registers
        if let Some(task) = self.speaking_task.take() {
            task.abort();
        }
        if let Some(request_id) = self.current_request.take() {
            self.deps.synthesizer.cancel(&request_id).await;
        }
        self.emit(ServerMessage::Speaking).await;
        match self.deps.synthesizer.synthesize(text, locale).await {
            Ok(handle) => {
                let request_id = handle.request_id.clone();
                self.current_request = Some(request_id.clone());
                let out = self.out.clone();
                let internal_tx = self.internal_tx.clone();
                let mut events = handle.events;
                self.speaking_task = Some(tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        match event {
                            SynthesisEvent::Chunk(data) => {
                                if out.send(ServerMessage::TtsAudio { data }).await.is_err() {
                                    break;
                                }
                            }
                            SynthesisEvent::Done => {
                                let _ = out.send(ServerMessage::TtsDone).await;
                                break;
                            }
                            SynthesisEvent::Failed(reason) => {
                                let _ = out.send(ServerMessage::Error { error: reason }).await;
                                break;
                            }
                        }
                    }
                    let _ = internal_tx.send(Internal::SpeakingFinished(request_id)).await;
                }));
            }
            Err(e) => {
                tracing::error!(session = %self.session_id, error = %e, "synthesis unavailable");
                self.emit(ServerMessage::Error {
                    error: e.to_string(),
                })
                .await;
                self.is_processing = false;
                self.emit(ServerMessage::Listening).await;
            }
        }
    }

    /// Barge-in: drop buffered audio and cancel any in-flight reply
    async fn interrupt(&mut self) {
        tracing::debug!(session = %self.session_id, "interrupt");
        self.buffer.clear();
        self.is_processing = false;
        self.timer_generation += 1;
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        if let Some(task) = self.speaking_task.take() {
            task.abort();
        }
        if let Some(request_id) = self.current_request.take() {
            self.deps.synthesizer.cancel(&request_id).await;
        }
        self.emit(ServerMessage::Interrupted).await;
        self.emit(ServerMessage::Listening).await;
    }

    async fn shutdown(&mut self) {
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        if let Some(task) = self.speaking_task.take() {
            task.abort();
        }
        if let Some(request_id) = self.current_request.take() {
            self.deps.synthesizer.cancel(&request_id).await;
        }
        // Defensive: drop any re-registered entry so the id cannot be reused
        self.deps.registry.remove(&self.session_id).await;
        tracing::info!(session = %self.session_id, turns = self.history.len(), "session ended");
    }

    async fn emit(&self, message: ServerMessage) {
        if self.out.send(message).await.is_err() {
            tracing::trace!(session = %self.session_id, "client gone, dropping event");
        }
    }
}
