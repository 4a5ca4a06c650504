//! Domain types shared by the repositories, the context builder, and the
//! HTTP layer.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Normalized transaction direction.
///
/// Imported banking rows carry `Credit`/`Debit` in
/// `credit_debit_indicator`; CRM rows store `income`/`expense` directly.
/// Normalization is case-insensitive and total: credit-like values map to
/// `Income`, everything else to `Expense`, which reproduces the sign/emoji
/// behavior of the reporting layer for unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Income,
    Expense,
}

impl Direction {
    pub fn from_raw(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "credit" | "income" => Direction::Income,
            _ => Direction::Expense,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Income => "income",
            Direction::Expense => "expense",
        }
    }

    pub fn sign(&self) -> char {
        match self {
            Direction::Income => '+',
            Direction::Expense => '-',
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Direction::Income => "💰",
            Direction::Expense => "💸",
        }
    }
}

/// Parsed client identifier.
///
/// Banking mode addresses clients by a composite `external-bank` string;
/// CRM mode uses a plain numeric id, which parses to a `ClientRef` with no
/// bank code. The split is on the **last** separator, so an external id that
/// itself contains `-` decodes ambiguously. That matches the source data
/// (external ids are `team047-N` style and banking ids always carry a bank
/// suffix) and is a known limitation rather than something to escape around.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRef {
    pub external_id: String,
    pub bank_code: Option<String>,
}

impl ClientRef {
    pub fn parse(id: &str) -> Self {
        match id.rsplit_once('-') {
            Some((external, bank)) => Self {
                external_id: external.to_string(),
                bank_code: Some(bank.to_string()),
            },
            None => Self {
                external_id: id.to_string(),
                bank_code: None,
            },
        }
    }

    pub fn composite(external_id: &str, bank_code: &str) -> String {
        format!("{}-{}", external_id, bank_code)
    }
}

/// A counterparty. In banking mode this is derived from grouping raw
/// imported rows by `(client_id, bank_code)`, not stored directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: String,
    pub created_at: Option<NaiveDateTime>,
    pub updated_at: Option<NaiveDateTime>,
}

/// A transaction belonging to exactly one client. `amount` is always
/// non-negative; the sign lives in `direction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub client_id: String,
    pub amount: f64,
    pub category: String,
    pub direction: String,
    pub description: Option<String>,
    pub transaction_date: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

/// Per-client financial summary, recomputed on every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub total_income: f64,
    pub total_expense: f64,
    pub balance: f64,
    pub transaction_count: i64,
}

/// One row of the per-client category breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub direction: String,
    pub total: f64,
    pub count: i64,
}

/// Persisted audit record of one AI exchange. A null client id marks a
/// global conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub client_id: Option<String>,
    pub question: String,
    pub answer: String,
    pub context_data: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}
