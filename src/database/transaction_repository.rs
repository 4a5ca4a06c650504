//! Transaction repository: schema-aware reads, CRM-only writes, and the
//! derived reporting figures (summary, category breakdown, peer rating).
//!
//! Banking-mode aggregation matches the exact-case `Credit`/`Debit` the
//! importer writes; case normalization happens at the presentation layer via
//! `Direction::from_raw`, not in every query.

use chrono::NaiveDateTime;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error::{AppError, AppResult};
use crate::models::{CategoryTotal, ClientRef, FinancialSummary, Transaction};

use super::client_repository::ClientRepository;
use super::schema::{SchemaDetector, SchemaMode};

/// Fallback category for imported rows without transaction information
pub const DEFAULT_BANKING_CATEGORY: &str = "Без категории";

#[derive(Clone)]
pub struct TransactionRepository {
    pool: SqlitePool,
    detector: SchemaDetector,
}

impl TransactionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        let detector = SchemaDetector::new(pool.clone());
        Self { pool, detector }
    }

    /// List a client's transactions, most recent first. `limit` truncates
    /// after ordering.
    pub async fn list_by_client(
        &self,
        client_id: &str,
        limit: Option<i64>,
    ) -> AppResult<Vec<Transaction>> {
        let columns = self.detector.transaction_columns().await;
        let has = |name: &str| columns.iter().any(|c| c == name);

        let client_ref = ClientRef::parse(client_id);

        let rows = if has("transaction_id") && has("client_id") {
            // Banking row shape. The date column is one of four fixed
            // literals chosen by introspection.
            let date_col = self.detector.transaction_date_column().await;
            let base = format!(
                r#"SELECT
                       t.transaction_id AS id,
                       t.client_id AS client_id,
                       t.bank_code AS bank_code,
                       t.amount AS amount,
                       COALESCE(t.transaction_information, '{default_category}') AS category,
                       t.credit_debit_indicator AS direction,
                       COALESCE(t.transaction_information, '') AS description,
                       DATE(t.{date_col}) AS transaction_date,
                       t.created_at AS created_at
                   FROM transactions t"#,
                default_category = DEFAULT_BANKING_CATEGORY,
                date_col = date_col,
            );

            match (&client_ref.bank_code, limit) {
                (Some(bank_code), Some(limit)) => {
                    let sql = format!(
                        "{base} WHERE t.client_id = ? AND t.bank_code = ? \
                         ORDER BY t.{date_col} DESC LIMIT ?"
                    );
                    sqlx::query(&sql)
                        .bind(&client_ref.external_id)
                        .bind(bank_code)
                        .bind(limit)
                        .fetch_all(&self.pool)
                        .await?
                }
                (Some(bank_code), None) => {
                    let sql = format!(
                        "{base} WHERE t.client_id = ? AND t.bank_code = ? \
                         ORDER BY t.{date_col} DESC"
                    );
                    sqlx::query(&sql)
                        .bind(&client_ref.external_id)
                        .bind(bank_code)
                        .fetch_all(&self.pool)
                        .await?
                }
                (None, Some(limit)) => {
                    let sql =
                        format!("{base} WHERE t.client_id = ? ORDER BY t.{date_col} DESC LIMIT ?");
                    sqlx::query(&sql)
                        .bind(&client_ref.external_id)
                        .bind(limit)
                        .fetch_all(&self.pool)
                        .await?
                }
                (None, None) => {
                    let sql = format!("{base} WHERE t.client_id = ? ORDER BY t.{date_col} DESC");
                    sqlx::query(&sql)
                        .bind(&client_ref.external_id)
                        .fetch_all(&self.pool)
                        .await?
                }
            }
        } else {
            // CRM row shape.
            match limit {
                Some(limit) => {
                    sqlx::query(
                        r#"SELECT id, client_id, amount, category, direction,
                                  description, transaction_date, created_at
                           FROM transactions
                           WHERE client_id = ?
                           ORDER BY transaction_date DESC, created_at DESC
                           LIMIT ?"#,
                    )
                    .bind(&client_ref.external_id)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query(
                        r#"SELECT id, client_id, amount, category, direction,
                                  description, transaction_date, created_at
                           FROM transactions
                           WHERE client_id = ?
                           ORDER BY transaction_date DESC, created_at DESC"#,
                    )
                    .bind(&client_ref.external_id)
                    .fetch_all(&self.pool)
                    .await?
                }
            }
        };

        Ok(rows.iter().map(transaction_from_row).collect())
    }

    /// Record a transaction. CRM mode only: banking transactions arrive
    /// through the external import, never through this service. Direction
    /// validity is the caller's responsibility.
    pub async fn create(
        &self,
        client_id: &str,
        amount: f64,
        category: &str,
        direction: &str,
        description: Option<&str>,
        transaction_date: Option<&str>,
    ) -> AppResult<i64> {
        if self.detector.transaction_mode().await == SchemaMode::Banking {
            return Err(AppError::invalid_operation(
                "Используйте банковский API для создания транзакций",
            ));
        }

        let result = match transaction_date {
            Some(date) => {
                sqlx::query(
                    r#"INSERT INTO transactions
                       (client_id, amount, category, direction, description, transaction_date)
                       VALUES (?, ?, ?, ?, ?, ?)"#,
                )
                .bind(client_id)
                .bind(amount)
                .bind(category)
                .bind(direction)
                .bind(description)
                .bind(date)
                .execute(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"INSERT INTO transactions
                       (client_id, amount, category, direction, description)
                       VALUES (?, ?, ?, ?, ?)"#,
                )
                .bind(client_id)
                .bind(amount)
                .bind(category)
                .bind(direction)
                .bind(description)
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.last_insert_rowid())
    }

    /// Financial summary for one client. An unknown client yields the
    /// all-zero summary rather than an error.
    pub async fn summary(&self, client_id: &str) -> AppResult<FinancialSummary> {
        let client_ref = ClientRef::parse(client_id);

        let row = match self.detector.transaction_mode().await {
            SchemaMode::Banking => match &client_ref.bank_code {
                Some(bank_code) => {
                    sqlx::query(
                        r#"SELECT
                               COALESCE(SUM(CASE WHEN credit_debit_indicator = 'Credit' THEN amount ELSE 0.0 END), 0.0) AS total_income,
                               COALESCE(SUM(CASE WHEN credit_debit_indicator = 'Debit' THEN amount ELSE 0.0 END), 0.0) AS total_expense,
                               COUNT(*) AS transaction_count
                           FROM transactions
                           WHERE client_id = ? AND bank_code = ?"#,
                    )
                    .bind(&client_ref.external_id)
                    .bind(bank_code)
                    .fetch_one(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query(
                        r#"SELECT
                               COALESCE(SUM(CASE WHEN credit_debit_indicator = 'Credit' THEN amount ELSE 0.0 END), 0.0) AS total_income,
                               COALESCE(SUM(CASE WHEN credit_debit_indicator = 'Debit' THEN amount ELSE 0.0 END), 0.0) AS total_expense,
                               COUNT(*) AS transaction_count
                           FROM transactions
                           WHERE client_id = ?"#,
                    )
                    .bind(&client_ref.external_id)
                    .fetch_one(&self.pool)
                    .await?
                }
            },
            SchemaMode::Crm => {
                sqlx::query(
                    r#"SELECT
                           COALESCE(SUM(CASE WHEN direction = 'income' THEN amount ELSE 0.0 END), 0.0) AS total_income,
                           COALESCE(SUM(CASE WHEN direction = 'expense' THEN amount ELSE 0.0 END), 0.0) AS total_expense,
                           COUNT(*) AS transaction_count
                       FROM transactions
                       WHERE client_id = ?"#,
                )
                .bind(&client_ref.external_id)
                .fetch_one(&self.pool)
                .await?
            }
        };

        let total_income: f64 = row.get("total_income");
        let total_expense: f64 = row.get("total_expense");
        Ok(FinancialSummary {
            total_income,
            total_expense,
            balance: total_income - total_expense,
            transaction_count: row.get("transaction_count"),
        })
    }

    /// Per-category totals for one client, grouped by (category, direction),
    /// largest total first.
    pub async fn by_category(&self, client_id: &str) -> AppResult<Vec<CategoryTotal>> {
        let client_ref = ClientRef::parse(client_id);

        let rows = match self.detector.transaction_mode().await {
            SchemaMode::Banking => {
                let base = format!(
                    r#"SELECT
                           COALESCE(transaction_information, '{DEFAULT_BANKING_CATEGORY}') AS category,
                           credit_debit_indicator AS direction,
                           SUM(amount) AS total,
                           COUNT(*) AS count
                       FROM transactions"#,
                );
                match &client_ref.bank_code {
                    Some(bank_code) => {
                        let sql = format!(
                            "{base} WHERE client_id = ? AND bank_code = ? \
                             GROUP BY transaction_information, credit_debit_indicator \
                             ORDER BY total DESC"
                        );
                        sqlx::query(&sql)
                            .bind(&client_ref.external_id)
                            .bind(bank_code)
                            .fetch_all(&self.pool)
                            .await?
                    }
                    None => {
                        let sql = format!(
                            "{base} WHERE client_id = ? \
                             GROUP BY transaction_information, credit_debit_indicator \
                             ORDER BY total DESC"
                        );
                        sqlx::query(&sql)
                            .bind(&client_ref.external_id)
                            .fetch_all(&self.pool)
                            .await?
                    }
                }
            }
            SchemaMode::Crm => {
                sqlx::query(
                    r#"SELECT category, direction, SUM(amount) AS total, COUNT(*) AS count
                       FROM transactions
                       WHERE client_id = ?
                       GROUP BY category, direction
                       ORDER BY total DESC"#,
                )
                .bind(&client_ref.external_id)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(rows
            .iter()
            .map(|row| CategoryTotal {
                category: row.get("category"),
                direction: row.get("direction"),
                total: row.get("total"),
                count: row.get("count"),
            })
            .collect())
    }

    /// Arithmetic mean of every client's balance; 0.0 with no clients.
    /// O(N) summary computations — fine for a reporting tool of this size.
    pub async fn average_balance(&self, clients: &ClientRepository) -> AppResult<f64> {
        let balances = self.all_balances(clients).await?;
        if balances.is_empty() {
            return Ok(0.0);
        }
        Ok(balances.iter().sum::<f64>() / balances.len() as f64)
    }

    /// Relative client rating in [1.0, 5.0] derived from peer balances.
    pub async fn client_rating(
        &self,
        clients: &ClientRepository,
        client_id: &str,
    ) -> AppResult<f64> {
        let balances = self.all_balances(clients).await?;
        let balance = self.summary(client_id).await?.balance;
        let rating = rating_from_balances(balance, &balances);
        debug!(
            "Рейтинг клиента {}: {} (баланс {:.2})",
            client_id, rating, balance
        );
        Ok(rating)
    }

    async fn all_balances(&self, clients: &ClientRepository) -> AppResult<Vec<f64>> {
        let all = clients.list(None).await?;
        let mut balances = Vec::with_capacity(all.len());
        for client in &all {
            balances.push(self.summary(&client.id).await?.balance);
        }
        Ok(balances)
    }
}

/// Square-root-compressed rating of one balance against the population.
///
/// A linear ratio-to-mean would let one outlier compress everyone else
/// toward 1.0; the square root softens the spread. Degenerate populations
/// (one client or fewer, or non-positive max/mean) score the neutral 3.0.
pub fn rating_from_balances(balance: f64, balances: &[f64]) -> f64 {
    if balances.len() <= 1 {
        return 3.0;
    }
    let max = balances.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mean = balances.iter().sum::<f64>() / balances.len() as f64;
    if max <= 0.0 || mean <= 0.0 {
        return 3.0;
    }

    let ratio = (balance.max(0.0) / mean).sqrt();
    let max_ratio = (max / mean).sqrt();
    let rating = 1.0 + 4.0 * (ratio / max_ratio);
    (rating.clamp(1.0, 5.0) * 10.0).round() / 10.0
}

fn transaction_from_row(row: &sqlx::sqlite::SqliteRow) -> Transaction {
    // Banking ids are TEXT, CRM ids are INTEGER rowids.
    let id = row
        .try_get::<String, _>("id")
        .unwrap_or_else(|_| row.get::<i64, _>("id").to_string());
    let client_id = row
        .try_get::<String, _>("client_id")
        .unwrap_or_else(|_| row.get::<i64, _>("client_id").to_string());
    Transaction {
        id,
        client_id,
        amount: row.get("amount"),
        category: row.get("category"),
        direction: row.get("direction"),
        description: row.try_get("description").ok().flatten(),
        transaction_date: row.try_get("transaction_date").ok().flatten(),
        created_at: row
            .try_get::<Option<NaiveDateTime>, _>("created_at")
            .ok()
            .flatten(),
    }
}
