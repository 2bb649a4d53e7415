//! Conversational reply generation over a chat-completions endpoint
//!
//! The system prompt is sent as the opening user turn followed by a short
//! synthetic acknowledgment from the assistant; this primes the persona
//! without depending on provider-specific system message handling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::pipeline::acknowledgment;
use crate::protocol::{ChatTurn, Role};
use crate::voice::Replier;
use crate::{Error, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Generates replies via an OpenAI-compatible chat endpoint
pub struct ChatReplier {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatReplier {
    #[must_use]
    pub fn new(config: LlmConfig) -> Self {
        if config.api_key.is_empty() {
            tracing::warn!("LLM API key not configured; generation calls will fail");
        }
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Replier for ChatReplier {
    async fn reply(
        &self,
        system_prompt: &str,
        history: &[ChatTurn],
        user_text: &str,
        locale: &str,
    ) -> Result<String> {
        let mut messages = Vec::with_capacity(history.len() + 3);
        messages.push(WireMessage {
            role: "user",
            content: system_prompt,
        });
        messages.push(WireMessage {
            role: "assistant",
            content: acknowledgment(locale),
        });
        for turn in history {
            messages.push(WireMessage {
                role: match turn.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: &turn.text,
            });
        }
        messages.push(WireMessage {
            role: "user",
            content: user_text,
        });

        tracing::debug!(
            turns = messages.len(),
            model = %self.config.model,
            "requesting reply"
        );

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "generation request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "generation API error");
            return Err(Error::Generation(format!(
                "generation error {status}: {body}"
            )));
        }

        let result: ChatResponse = response.json().await?;
        let reply = result
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        tracing::info!(chars = reply.len(), "reply generated");
        Ok(reply)
    }
}
