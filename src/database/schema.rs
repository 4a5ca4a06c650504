//! Schema detection for the two physical layouts.
//!
//! Both layouts may exist across deployments of the same binary, and the
//! store can even be swapped underneath a running process, so the mode is
//! re-probed on every repository operation instead of cached. The probe is a
//! single PRAGMA per table; introspection failure degrades to CRM.

use sqlx::SqlitePool;

use super::table_columns;

/// Which physical layout the store currently carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    /// Imported multi-bank layout: raw rows keyed by (client_id, bank_code)
    Banking,
    /// Manually maintained layout with plain numeric ids
    Crm,
}

/// Stateless detector over a live pool.
#[derive(Clone)]
pub struct SchemaDetector {
    pool: SqlitePool,
}

impl SchemaDetector {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Mode of the clients table: banking iff a `bank_code` column exists.
    pub async fn client_mode(&self) -> SchemaMode {
        let columns = table_columns(&self.pool, "clients").await;
        if columns.iter().any(|c| c == "bank_code") {
            SchemaMode::Banking
        } else {
            SchemaMode::Crm
        }
    }

    /// Mode of the transactions table: banking iff the credit/debit
    /// indicator or the external transaction id column is present.
    pub async fn transaction_mode(&self) -> SchemaMode {
        let columns = table_columns(&self.pool, "transactions").await;
        let banking = columns
            .iter()
            .any(|c| c == "credit_debit_indicator" || c == "transaction_id");
        if banking {
            SchemaMode::Banking
        } else {
            SchemaMode::Crm
        }
    }

    /// Ordering column for transactions, chosen by presence. The result is
    /// always one of these four literals, so interpolating it into SQL stays
    /// within a fixed allow-list.
    pub async fn transaction_date_column(&self) -> &'static str {
        let columns = table_columns(&self.pool, "transactions").await;
        for candidate in ["booking_date_time", "value_date_time", "created_at"] {
            if columns.iter().any(|c| c == candidate) {
                return candidate;
            }
        }
        "id"
    }

    /// Raw column listing, used by the transaction repository to branch on
    /// the banking row shape.
    pub async fn transaction_columns(&self) -> Vec<String> {
        table_columns(&self.pool, "transactions").await
    }
}
