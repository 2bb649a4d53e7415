//! Session registry: one-shot handoff from the setup call to the socket
//!
//! The HTTP setup endpoint writes an entry; the WebSocket that later connects
//! with the same session id consumes it exactly once. A periodic sweep purges
//! entries whose client never connected.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::protocol::ChatTurn;

/// Pre-negotiated configuration awaiting its socket
#[derive(Debug, Clone)]
pub struct RegisteredSession {
    pub system_prompt: String,
    pub locale: String,
    pub context_type: String,
    pub greeting: String,
    /// Prior conversation when resuming; empty for a fresh session
    pub messages: Vec<ChatTurn>,
    pub created_at: DateTime<Utc>,
}

/// Process-wide map of registered session configurations
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<RwLock<HashMap<String, RegisteredSession>>>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a configuration, replacing any previous entry for the id
    pub async fn register(&self, session_id: &str, entry: RegisteredSession) {
        let replaced = self
            .entries
            .write()
            .await
            .insert(session_id.to_string(), entry)
            .is_some();
        tracing::debug!(session = %session_id, replaced, "session registered");
    }

    /// Consume the entry for a session id; it will not be found again
    pub async fn take(&self, session_id: &str) -> Option<RegisteredSession> {
        self.entries.write().await.remove(session_id)
    }

    /// Inspect an entry without consuming it
    pub async fn peek(&self, session_id: &str) -> Option<RegisteredSession> {
        self.entries.read().await.get(session_id).cloned()
    }

    /// Remove an entry; returns whether one existed
    pub async fn remove(&self, session_id: &str) -> bool {
        self.entries.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Purge entries older than `max_age`; returns how many were removed
    pub async fn sweep(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now()
            - TimeDelta::from_std(max_age).unwrap_or_else(|_| TimeDelta::seconds(3600));
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.created_at > cutoff);
        before - entries.len()
    }

    /// Spawn the periodic retention sweep
    pub fn spawn_sweeper(&self, retention: Duration, interval: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; skip it so a fresh process
            // doesn't sweep an empty map
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = registry.sweep(retention).await;
                if purged > 0 {
                    tracing::info!(purged, "swept stale session registrations");
                }
            }
        })
    }
}
