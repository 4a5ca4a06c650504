//! Database connection and schema management.
//!
//! Provides pool construction, startup schema bootstrap, and the column
//! introspection primitive the schema detector is built on. The store is an
//! ordinary SQLite file: either one produced by the external multi-bank
//! import (banking layout) or one this service creates itself (CRM layout).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use tracing::{info, warn};

pub mod client_repository;
pub mod conversation_repository;
pub mod schema;
pub mod transaction_repository;

pub use client_repository::ClientRepository;
pub use conversation_repository::ConversationRepository;
pub use schema::{SchemaDetector, SchemaMode};
pub use transaction_repository::TransactionRepository;

/// Connect to the SQLite database file, creating it if missing.
pub async fn connect(database_file: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", database_file))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Connect to an in-memory database. One connection only, so every caller
/// observes the same store.
pub async fn connect_in_memory() -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
}

/// List the column names of a table. Returns an empty list when the table is
/// absent or introspection fails; callers treat that as the CRM default.
pub async fn table_columns(pool: &SqlitePool, table: &str) -> Vec<String> {
    // PRAGMA does not accept bound parameters; the table name comes from the
    // fixed set of tables this crate knows about, never from user input.
    let query = format!("PRAGMA table_info({})", table);
    match sqlx::query(&query).fetch_all(pool).await {
        Ok(rows) => rows
            .iter()
            .filter_map(|row| row.try_get::<String, _>("name").ok())
            .collect(),
        Err(e) => {
            warn!("Не удалось прочитать схему таблицы {}: {}", table, e);
            Vec::new()
        }
    }
}

/// Check whether a table exists.
async fn table_exists(pool: &SqlitePool, table: &str) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Bring the store to a usable state at startup.
///
/// An existing banking database only gains the `ai_conversations` table; an
/// existing CRM database is checked for the same; a fresh file gets the full
/// CRM schema. Banking tables are never created here — they come from the
/// external import process.
pub async fn init(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    if table_exists(pool, "clients").await? {
        let columns = table_columns(pool, "clients").await;
        if columns.iter().any(|c| c == "bank_code") {
            info!("Обнаружена банковская структура БД");
        } else {
            info!("Обнаружена CRM структура БД");
        }
        ensure_conversations_table(pool).await?;
        return Ok(());
    }

    info!("Создается новая CRM база данных");
    create_crm_schema(pool).await
}

/// Create the CRM layout: clients, transactions, ai_conversations, indexes.
pub async fn create_crm_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS clients (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               name TEXT NOT NULL,
               email TEXT,
               phone TEXT,
               status TEXT DEFAULT 'active',
               created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
               updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
           )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS transactions (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               client_id INTEGER NOT NULL,
               amount REAL NOT NULL,
               category TEXT NOT NULL,
               direction TEXT NOT NULL CHECK(direction IN ('income', 'expense')),
               description TEXT,
               transaction_date DATE DEFAULT CURRENT_DATE,
               created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
               FOREIGN KEY (client_id) REFERENCES clients (id) ON DELETE CASCADE
           )"#,
    )
    .execute(pool)
    .await?;

    ensure_conversations_table(pool).await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_transactions_client ON transactions(client_id)",
        "CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(transaction_date)",
        "CREATE INDEX IF NOT EXISTS idx_clients_status ON clients(status)",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

async fn ensure_conversations_table(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS ai_conversations (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               client_id TEXT,
               question TEXT NOT NULL,
               answer TEXT NOT NULL,
               context_data TEXT,
               created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
           )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_conversations_client ON ai_conversations(client_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
