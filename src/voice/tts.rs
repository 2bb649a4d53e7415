//! Streaming speech synthesis over a persistent WebSocket
//!
//! One connection to the synthesis engine is shared by every session. Each
//! `synthesize` call registers a per-request channel in a pending map keyed
//! by a generated context id; incoming engine messages are demultiplexed by
//! that id. Cancellation removes the entry so stray messages for a canceled
//! request are dropped. The connection is dialed eagerly at startup and
//! re-dialed with capped exponential backoff when it drops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::config::TtsConfig;
use crate::voice::{SynthesisEvent, SynthesisHandle, Synthesizer, language_of};
use crate::{Error, Result};

type Pending = Arc<Mutex<HashMap<String, mpsc::Sender<SynthesisEvent>>>>;

/// Request forwarded to the connection task
struct OutboundRequest {
    context_id: String,
    text: String,
    language: String,
}

/// Structured synthesis request sent over the engine socket
#[derive(Serialize)]
struct EngineRequest<'a> {
    model_id: &'a str,
    transcript: &'a str,
    voice: VoiceRef<'a>,
    language: &'a str,
    context_id: &'a str,
    /// False: this is a complete text segment, nothing more follows for it
    #[serde(rename = "continue")]
    more: bool,
    output_format: OutputFormat,
    /// Kept at the minimum; the full text is already known
    max_buffer_delay_ms: u64,
}

#[derive(Serialize)]
struct VoiceRef<'a> {
    mode: &'static str,
    id: &'a str,
}

#[derive(Serialize, Clone, Copy)]
struct OutputFormat {
    container: &'static str,
    encoding: &'static str,
    sample_rate: u32,
}

/// Asynchronous message from the engine socket
#[derive(Deserialize)]
struct EngineMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    context_id: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Shared streaming synthesizer client
pub struct SpeechSocket {
    pending: Pending,
    outbound: mpsc::Sender<OutboundRequest>,
}

impl SpeechSocket {
    /// Start the connection task and dial the engine eagerly
    #[must_use]
    pub fn connect(config: TtsConfig) -> Self {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (outbound_tx, outbound_rx) = mpsc::channel(64);
        tokio::spawn(run_connection(config, pending.clone(), outbound_rx));
        Self {
            pending,
            outbound: outbound_tx,
        }
    }
}

#[async_trait]
impl Synthesizer for SpeechSocket {
    async fn synthesize(&self, text: &str, locale: &str) -> Result<SynthesisHandle> {
        let context_id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(64);
        self.pending.lock().await.insert(context_id.clone(), tx);

        let request = OutboundRequest {
            context_id: context_id.clone(),
            text: text.to_string(),
            language: language_of(locale).to_string(),
        };
        // Queued requests wait behind any reconnect in progress; the channel
        // closes only once retries are exhausted
        if self.outbound.send(request).await.is_err() {
            self.pending.lock().await.remove(&context_id);
            return Err(Error::Tts("synthesis connection unavailable".to_string()));
        }

        tracing::debug!(request = %context_id, chars = text.len(), "synthesis requested");
        Ok(SynthesisHandle {
            request_id: context_id,
            events: rx,
        })
    }

    async fn cancel(&self, request_id: &str) {
        let removed = self.pending.lock().await.remove(request_id).is_some();
        tracing::debug!(request = %request_id, removed, "synthesis canceled");
    }
}

/// Delay before reconnect attempt `attempt` (1-based)
fn backoff_delay(attempt: u32, base_ms: u64, cap_ms: u64) -> Duration {
    let exp = base_ms.saturating_mul(1_u64 << attempt.saturating_sub(1).min(16));
    Duration::from_millis(exp.min(cap_ms))
}

/// Reject every pending request and clear the map
async fn fail_all(pending: &Pending, reason: &str) {
    let waiters: Vec<_> = pending.lock().await.drain().collect();
    for (id, tx) in waiters {
        tracing::debug!(request = %id, "rejecting pending synthesis request");
        let _ = tx.send(SynthesisEvent::Failed(reason.to_string())).await;
    }
}

/// Reject a single pending request if still registered
async fn fail_request(pending: &Pending, context_id: &str, reason: &str) {
    let waiter = pending.lock().await.remove(context_id);
    if let Some(tx) = waiter {
        let _ = tx.send(SynthesisEvent::Failed(reason.to_string())).await;
    }
}

/// Route one engine message to its waiting request, if any
async fn route_engine_message(pending: &Pending, raw: &str) {
    let Ok(msg) = serde_json::from_str::<EngineMessage>(raw) else {
        tracing::warn!("unparseable synthesis engine message");
        return;
    };
    let Some(context_id) = msg.context_id else {
        tracing::trace!(kind = %msg.kind, "engine message without context id");
        return;
    };

    match msg.kind.as_str() {
        "chunk" => {
            let waiter = pending.lock().await.get(&context_id).cloned();
            // Completed or canceled requests are silently dropped
            let Some(tx) = waiter else { return };
            let Some(data) = msg.data else { return };
            match STANDARD.decode(data) {
                Ok(audio) => {
                    if tx.send(SynthesisEvent::Chunk(audio)).await.is_err() {
                        // Receiver gone; stop routing this request
                        pending.lock().await.remove(&context_id);
                    }
                }
                Err(e) => {
                    fail_request(pending, &context_id, &format!("bad audio payload: {e}")).await;
                }
            }
        }
        "done" => {
            let waiter = pending.lock().await.remove(&context_id);
            if let Some(tx) = waiter {
                let _ = tx.send(SynthesisEvent::Done).await;
            }
        }
        "error" => {
            let reason = msg.error.unwrap_or_else(|| "synthesis failed".to_string());
            tracing::warn!(request = %context_id, error = %reason, "engine reported error");
            fail_request(pending, &context_id, &reason).await;
        }
        other => {
            tracing::trace!(kind = %other, "ignoring engine message");
        }
    }
}

/// Connection task: dial, pump, reconnect with backoff, give up after the
/// configured attempt budget
async fn run_connection(
    config: TtsConfig,
    pending: Pending,
    mut outbound: mpsc::Receiver<OutboundRequest>,
) {
    let url = if config.api_key.is_empty() {
        config.ws_url.clone()
    } else {
        format!("{}?api_key={}", config.ws_url, config.api_key)
    };
    let output_format = OutputFormat {
        container: "raw",
        encoding: "pcm_s16le",
        sample_rate: config.output_sample_rate,
    };

    let mut attempt: u32 = 0;
    loop {
        let stream = match connect_async(url.as_str()).await {
            Ok((stream, _)) => {
                tracing::info!(url = %config.ws_url, "synthesis socket connected");
                attempt = 0;
                stream
            }
            Err(e) => {
                attempt += 1;
                if attempt > config.max_reconnect_attempts {
                    tracing::error!(error = %e, "synthesis reconnect budget exhausted");
                    fail_all(&pending, "synthesis engine unreachable").await;
                    // Dropping the receiver makes later synthesize calls fail
                    // instead of queueing forever
                    outbound.close();
                    return;
                }
                let delay = backoff_delay(attempt, config.backoff_base_ms, config.backoff_cap_ms);
                tracing::warn!(error = %e, attempt, ?delay, "synthesis connect failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        let (mut write, mut read) = stream.split();
        loop {
            tokio::select! {
                request = outbound.recv() => {
                    let Some(request) = request else {
                        // Adapter dropped; shut the socket down
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    };
                    let engine_request = EngineRequest {
                        model_id: &config.model_id,
                        transcript: &request.text,
                        voice: VoiceRef { mode: "id", id: &config.voice_id },
                        language: &request.language,
                        context_id: &request.context_id,
                        more: false,
                        output_format,
                        max_buffer_delay_ms: config.max_buffer_delay_ms,
                    };
                    let payload = match serde_json::to_string(&engine_request) {
                        Ok(payload) => payload,
                        Err(e) => {
                            fail_request(&pending, &request.context_id, &e.to_string()).await;
                            continue;
                        }
                    };
                    if let Err(e) = write.send(Message::text(payload)).await {
                        tracing::warn!(error = %e, "synthesis send failed");
                        fail_request(&pending, &request.context_id, "synthesis send failed").await;
                        break;
                    }
                }
                incoming = read.next() => {
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            route_engine_message(&pending, text.as_str()).await;
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Binary(_))) => {}
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::warn!("synthesis socket closed by engine");
                            break;
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "synthesis socket error");
                            break;
                        }
                    }
                }
            }
        }

        // Connection dropped: everything in flight is lost
        fail_all(&pending, "synthesis connection lost").await;
        attempt += 1;
        if attempt > config.max_reconnect_attempts {
            tracing::error!("synthesis reconnect budget exhausted");
            outbound.close();
            return;
        }
        let delay = backoff_delay(attempt, config.backoff_base_ms, config.backoff_cap_ms);
        tracing::warn!(attempt, ?delay, "reconnecting synthesis socket");
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn chunk_routes_to_registered_request() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(8);
        pending.lock().await.insert("ctx-1".to_string(), tx);

        let raw = format!(
            r#"{{"type":"chunk","context_id":"ctx-1","data":"{}"}}"#,
            STANDARD.encode([1u8, 2, 3])
        );
        route_engine_message(&pending, &raw).await;

        match rx.recv().await {
            Some(SynthesisEvent::Chunk(audio)) => assert_eq!(audio, vec![1, 2, 3]),
            other => panic!("expected chunk, got {other:?}"),
        }
        // Chunk does not complete the request
        assert!(pending.lock().await.contains_key("ctx-1"));
    }

    #[tokio::test]
    async fn done_completes_and_removes() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(8);
        pending.lock().await.insert("ctx-1".to_string(), tx);

        route_engine_message(&pending, r#"{"type":"done","context_id":"ctx-1"}"#).await;

        assert!(matches!(rx.recv().await, Some(SynthesisEvent::Done)));
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn error_rejects_and_removes() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(8);
        pending.lock().await.insert("ctx-1".to_string(), tx);

        route_engine_message(
            &pending,
            r#"{"type":"error","context_id":"ctx-1","error":"voice not found"}"#,
        )
        .await;

        match rx.recv().await {
            Some(SynthesisEvent::Failed(reason)) => assert_eq!(reason, "voice not found"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_context_is_dropped_silently() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx, mut rx) = mpsc::channel(8);
        pending.lock().await.insert("ctx-live".to_string(), tx);

        // Message for a canceled/completed id must not reach anyone
        route_engine_message(
            &pending,
            r#"{"type":"chunk","context_id":"ctx-gone","data":"AAAA"}"#,
        )
        .await;

        assert!(rx.try_recv().is_err());
        assert!(pending.lock().await.contains_key("ctx-live"));
    }

    #[tokio::test]
    async fn fail_all_drains_every_waiter() {
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        {
            let mut map = pending.lock().await;
            map.insert("a".to_string(), tx1);
            map.insert("b".to_string(), tx2);
        }

        fail_all(&pending, "connection lost").await;

        assert!(matches!(rx1.recv().await, Some(SynthesisEvent::Failed(_))));
        assert!(matches!(rx2.recv().await, Some(SynthesisEvent::Failed(_))));
        assert!(pending.lock().await.is_empty());
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1, 500, 8000), Duration::from_millis(500));
        assert_eq!(backoff_delay(2, 500, 8000), Duration::from_millis(1000));
        assert_eq!(backoff_delay(3, 500, 8000), Duration::from_millis(2000));
        assert_eq!(backoff_delay(10, 500, 8000), Duration::from_millis(8000));
    }

    #[test]
    fn engine_request_declares_complete_segment() {
        let request = EngineRequest {
            model_id: "sonic-2",
            transcript: "hello",
            voice: VoiceRef { mode: "id", id: "v1" },
            language: "ko",
            context_id: "ctx-1",
            more: false,
            output_format: OutputFormat {
                container: "raw",
                encoding: "pcm_s16le",
                sample_rate: 44_100,
            },
            max_buffer_delay_ms: 0,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"continue\":false"));
        assert!(json.contains("\"sample_rate\":44100"));
        assert!(json.contains("\"max_buffer_delay_ms\":0"));
    }
}
