//! AI integration: context assembly and the chat-completion gateway.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::AppError;

pub mod client;
pub mod context;

pub use client::AiGateway;
pub use context::ContextBuilder;

/// Failures the gateway reports instead of raising. Timeout is kept apart
/// from other network failures so the operator can tell the two causes
/// apart.
#[derive(Error, Debug)]
pub enum AskError {
    #[error("AI сервис не отвечает (таймаут {0} сек)")]
    Timeout(u64),

    #[error("Ошибка подключения к AI: {0}")]
    Network(String),

    #[error("AI API ошибка: {status}{}", if .message.is_empty() { String::new() } else { format!(" - {}", .message) })]
    Api { status: u16, message: String },

    #[error("Некорректный ответ AI: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    App(#[from] AppError),
}

pub type AskResult<T> = Result<T, AskError>;

/// Successful gateway outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskAnswer {
    pub answer: String,
    pub model: String,
    pub has_context: bool,
    pub context_summary: Option<ContextSummary>,
}

/// Condensed client snapshot attached to an answer, recomputed from the
/// repositories rather than parsed out of the model's reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSummary {
    pub client_name: Option<String>,
    pub transaction_count: i64,
    pub balance: f64,
}

/// Canned question suggestions for the UI.
pub fn suggested_questions(client_selected: bool) -> Vec<&'static str> {
    if client_selected {
        vec![
            "Проанализируй расходы клиента",
            "Какие основные категории доходов?",
            "Есть ли необычные транзакции?",
            "Дай рекомендации по оптимизации расходов",
            "Сделай финансовый профиль клиента",
        ]
    } else {
        vec![
            "Сколько всего клиентов в CRM?",
            "Какая общая статистика по доходам?",
            "Покажи топ клиентов по обороту",
            "Как работает AI ассистент?",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_message_with_detail() {
        let err = AskError::Api {
            status: 429,
            message: "Rate limit exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "AI API ошибка: 429 - Rate limit exceeded");
    }

    #[test]
    fn test_api_error_message_without_detail() {
        let err = AskError::Api {
            status: 503,
            message: String::new(),
        };
        assert_eq!(err.to_string(), "AI API ошибка: 503");
    }

    #[test]
    fn test_suggestions_differ_by_scope() {
        assert_ne!(suggested_questions(true), suggested_questions(false));
        assert!(!suggested_questions(false).is_empty());
    }
}
