//! Process configuration loaded from the environment at startup.
//!
//! No hot-reload: the config is read once in `main` (after `dotenvy`) and
//! shared behind the application state.

use serde::{Deserialize, Serialize};

/// Default system prompt for the AI consultant
const DEFAULT_SYSTEM_PROMPT: &str = "\
Ты — AI-консультант в CRM-системе для финансового анализа.
Твоя задача — помогать менеджерам анализировать клиентов и их транзакции.

Правила работы:
1. Отвечай на русском языке простым и понятным языком
2. Используй предоставленный контекст о клиенте для точных ответов
3. Если данных недостаточно — так и скажи, не придумывай!
4. Для сумм используй формат: 125,000 ₽
5. Давай конкретные рекомендации на основе данных
6. Будь вежливым и профессиональным
7. Если видишь проблемы (например, большой минус) — предупреди менеджера
";

/// Client status labels (closed set, CRM mode)
pub const CLIENT_STATUSES: [(&str, &str); 4] = [
    ("active", "Активен"),
    ("inactive", "Неактивен"),
    ("vip", "VIP"),
    ("blocked", "Заблокирован"),
];

/// Substitute contact pair assigned to imported clients that carry none
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockContact {
    pub email: String,
    pub phone: String,
}

/// AI gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// Chat-completion endpoint URL
    pub api_url: String,

    /// Bearer token for the endpoint
    pub api_key: String,

    /// Model name to request
    pub model: String,

    /// Maximum tokens in response
    pub max_tokens: u32,

    /// Temperature for response generation
    pub temperature: f32,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// System prompt prepended to every conversation
    pub system_prompt: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: env_or("AI_API_URL", "https://openrouter.ai/api/v1/chat/completions"),
            api_key: std::env::var("AI_API_KEY").unwrap_or_default(),
            model: env_or("AI_MODEL", "google/gemini-2.5-flash-lite"),
            max_tokens: env_parse("AI_MAX_TOKENS", 2048),
            temperature: env_parse("AI_TEMPERATURE", 0.7),
            timeout_seconds: env_parse("AI_TIMEOUT", 30),
            system_prompt: env_or("AI_SYSTEM_PROMPT", DEFAULT_SYSTEM_PROMPT),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file
    pub database_file: String,

    /// Bind address
    pub host: String,
    pub port: u16,

    /// Basic-auth values carried for the presentation layer; enforcement is
    /// not part of this core
    pub auth_username: String,
    pub auth_password_hash: String,

    pub ai: AiConfig,

    /// Ordered pool for mock contact backfill; may be empty
    pub mock_contacts: Vec<MockContact>,
}

impl AppConfig {
    /// Load configuration from the environment
    pub fn from_env() -> Self {
        Self {
            database_file: env_or("DATABASE_FILE", "multibank_real.db"),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse("PORT", 5000),
            auth_username: env_or("AUTH_USERNAME", "admin"),
            auth_password_hash: std::env::var("AUTH_PASSWORD_HASH").unwrap_or_default(),
            ai: AiConfig::default(),
            mock_contacts: parse_mock_contacts(
                &std::env::var("MOCK_CONTACTS").unwrap_or_default(),
            ),
        }
    }
}

/// Parse the `email:phone,email:phone` contact pool format.
/// Entries without a `:` are skipped.
pub fn parse_mock_contacts(raw: &str) -> Vec<MockContact> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (email, phone) = entry.split_once(':')?;
            Some(MockContact {
                email: email.trim().to_string(),
                phone: phone.trim().to_string(),
            })
        })
        .collect()
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
