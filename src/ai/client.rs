//! Chat-completion gateway.
//!
//! One synchronous (from the caller's point of view) POST per question to
//! the configured OpenAI-compatible endpoint, bearer-token authenticated,
//! with a fixed timeout and no retries. The bulk import retries; this
//! gateway deliberately does not.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::AiConfig;
use crate::database::{ClientRepository, TransactionRepository};

use super::context::ContextBuilder;
use super::{AskAnswer, AskError, AskResult};

/// Chat message in the OpenAI wire format
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system",
            content: content.into(),
        }
    }

    fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user",
            content: content.into(),
        }
    }

    fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant",
            content: content.into(),
        }
    }
}

/// Request body for the chat-completion endpoint
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
    temperature: f32,
}

/// Response body, reduced to the parts this gateway reads
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Upstream error envelope; every field optional because providers differ
#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: Option<UpstreamErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    message: Option<String>,
}

#[derive(Clone)]
pub struct AiGateway {
    config: AiConfig,
    http: Client,
    context: ContextBuilder,
}

impl AiGateway {
    pub fn new(
        config: AiConfig,
        clients: ClientRepository,
        transactions: TransactionRepository,
    ) -> AskResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AskError::Network(e.to_string()))?;
        let context = ContextBuilder::new(clients, transactions);
        Ok(Self {
            config,
            http,
            context,
        })
    }

    /// Ask the model a question, optionally grounded in one client's
    /// financial context. A single attempt; all failure causes come back as
    /// a structured `AskError`, never a panic or raw transport error.
    pub async fn ask(&self, question: &str, client_id: Option<&str>) -> AskResult<AskAnswer> {
        let context = self.context.build(client_id).await?;
        let messages = build_messages(&self.config.system_prompt, &context, question);

        let payload = ChatRequest {
            model: &self.config.model,
            messages: &messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        debug!(
            "Запрос к AI: модель {}, сообщений {}",
            self.config.model,
            messages.len()
        );

        let response = self
            .http
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AskError::Timeout(self.config.timeout_seconds)
                } else {
                    AskError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AskError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = parse_upstream_error(&body).unwrap_or_default();
            error!("AI API ошибка: {} - {}", status, message);
            return Err(AskError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| AskError::InvalidResponse(e.to_string()))?;
        let answer = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| AskError::InvalidResponse("пустой список choices".to_string()))?;

        let context_summary = match client_id {
            Some(id) => Some(self.context.summary(id).await?),
            None => None,
        };

        info!("AI ответил ({} символов)", answer.len());
        Ok(AskAnswer {
            answer,
            model: self.config.model.clone(),
            has_context: !context.is_empty(),
            context_summary,
        })
    }
}

/// Compose the message sequence: system prompt, then — only when context is
/// non-empty — a synthetic context hand-off, then the real question.
fn build_messages(system_prompt: &str, context: &str, question: &str) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    if !context.is_empty() {
        messages.push(ChatMessage::user(format!("Контекст:\n{}", context)));
        messages.push(ChatMessage::assistant(
            "Понял. Готов ответить на вопросы по этому клиенту!",
        ));
    }
    messages.push(ChatMessage::user(question));
    messages
}

fn parse_upstream_error(body: &str) -> Option<String> {
    serde_json::from_str::<UpstreamErrorBody>(body)
        .ok()?
        .error?
        .message
}
