//! Client repository: schema-aware CRUD over counterparties.
//!
//! CRM mode is plain row CRUD. Banking mode derives clients by grouping the
//! raw imported rows by (client_id, bank_code): two rows sharing an external
//! id but differing in bank code are two distinct clients. Banking records
//! are immutable here — updates and deletes are no-ops, and creation only
//! produces a schema-compatible manual stub.

use chrono::NaiveDateTime;
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::config::MockContact;
use crate::error::AppResult;
use crate::models::{Client, ClientRef};

use super::schema::{SchemaDetector, SchemaMode};

/// Bank code literal tagging stub clients created while in banking mode
pub const MANUAL_BANK_CODE: &str = "MANUAL";

/// Optional field set for client updates
#[derive(Debug, Clone, Default)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct ClientRepository {
    pool: SqlitePool,
    detector: SchemaDetector,
    mock_contacts: Vec<MockContact>,
}

impl ClientRepository {
    pub fn new(pool: SqlitePool, mock_contacts: Vec<MockContact>) -> Self {
        let detector = SchemaDetector::new(pool.clone());
        Self {
            pool,
            detector,
            mock_contacts,
        }
    }

    /// List clients, newest first in CRM mode, grouped by (external id,
    /// bank code) in banking mode. The status filter only applies in CRM
    /// mode; banking clients are always `active`.
    pub async fn list(&self, status: Option<&str>) -> AppResult<Vec<Client>> {
        match self.detector.client_mode().await {
            SchemaMode::Banking => {
                let rows = sqlx::query(
                    r#"SELECT client_id, bank_code, MIN(created_at) AS created_at
                       FROM clients
                       GROUP BY client_id, bank_code
                       ORDER BY bank_code, client_id"#,
                )
                .fetch_all(&self.pool)
                .await?;

                let mut clients: Vec<Client> =
                    rows.iter().map(banking_client_from_row).collect();
                apply_mock_contacts(&mut clients, &self.mock_contacts);
                debug!("Банковская структура: {} клиентов", clients.len());
                Ok(clients)
            }
            SchemaMode::Crm => {
                let rows = match status {
                    Some(status) => {
                        sqlx::query(
                            r#"SELECT id, name, email, phone, status, created_at, updated_at
                               FROM clients
                               WHERE status = ?
                               ORDER BY id DESC"#,
                        )
                        .bind(status)
                        .fetch_all(&self.pool)
                        .await?
                    }
                    None => {
                        sqlx::query(
                            r#"SELECT id, name, email, phone, status, created_at, updated_at
                               FROM clients
                               ORDER BY id DESC"#,
                        )
                        .fetch_all(&self.pool)
                        .await?
                    }
                };
                Ok(rows.iter().map(crm_client_from_row).collect())
            }
        }
    }

    /// Look up one client. Banking mode requires an exact (external id,
    /// bank code) match when the composite id carries a bank code, and falls
    /// back to the first row matching the external id alone otherwise.
    pub async fn get_by_id(&self, id: &str) -> AppResult<Option<Client>> {
        match self.detector.client_mode().await {
            SchemaMode::Banking => {
                let client_ref = ClientRef::parse(id);
                let row = match &client_ref.bank_code {
                    Some(bank_code) => {
                        sqlx::query(
                            r#"SELECT client_id, bank_code, created_at
                               FROM clients
                               WHERE client_id = ? AND bank_code = ?
                               LIMIT 1"#,
                        )
                        .bind(&client_ref.external_id)
                        .bind(bank_code)
                        .fetch_optional(&self.pool)
                        .await?
                    }
                    None => {
                        sqlx::query(
                            r#"SELECT client_id, bank_code, created_at
                               FROM clients
                               WHERE client_id = ?
                               LIMIT 1"#,
                        )
                        .bind(&client_ref.external_id)
                        .fetch_optional(&self.pool)
                        .await?
                    }
                };
                Ok(row.as_ref().map(banking_client_from_row))
            }
            SchemaMode::Crm => {
                let Ok(numeric_id) = id.parse::<i64>() else {
                    return Ok(None);
                };
                let row = sqlx::query(
                    r#"SELECT id, name, email, phone, status, created_at, updated_at
                       FROM clients
                       WHERE id = ?"#,
                )
                .bind(numeric_id)
                .fetch_optional(&self.pool)
                .await?;
                Ok(row.as_ref().map(crm_client_from_row))
            }
        }
    }

    /// Create a client. CRM mode inserts a normal row; banking mode inserts
    /// a stub row under the `MANUAL` bank code so callers can treat "new
    /// record" uniformly across both modes. Returns the new client id
    /// (composite in banking mode).
    pub async fn create(
        &self,
        name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        status: &str,
    ) -> AppResult<String> {
        match self.detector.client_mode().await {
            SchemaMode::Banking => {
                let external_id: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(8)
                    .map(char::from)
                    .collect();
                sqlx::query("INSERT INTO clients (client_id, bank_code) VALUES (?, ?)")
                    .bind(&external_id)
                    .bind(MANUAL_BANK_CODE)
                    .execute(&self.pool)
                    .await?;
                debug!("Создан ручной клиент {} (банковская структура)", name);
                Ok(ClientRef::composite(&external_id, MANUAL_BANK_CODE))
            }
            SchemaMode::Crm => {
                let result = sqlx::query(
                    "INSERT INTO clients (name, email, phone, status) VALUES (?, ?, ?, ?)",
                )
                .bind(name)
                .bind(email)
                .bind(phone)
                .bind(status)
                .execute(&self.pool)
                .await?;
                Ok(result.last_insert_rowid().to_string())
            }
        }
    }

    /// Update client fields. CRM mode only; banking records are immutable
    /// and report zero rows affected.
    pub async fn update(&self, id: &str, fields: ClientUpdate) -> AppResult<u64> {
        if self.detector.client_mode().await == SchemaMode::Banking {
            return Ok(0);
        }
        let Ok(numeric_id) = id.parse::<i64>() else {
            return Ok(0);
        };

        let mut updates = Vec::new();
        let mut params = Vec::new();
        for (column, value) in [
            ("name", fields.name),
            ("email", fields.email),
            ("phone", fields.phone),
            ("status", fields.status),
        ] {
            if let Some(value) = value {
                updates.push(format!("{} = ?", column));
                params.push(value);
            }
        }
        if updates.is_empty() {
            return Ok(0);
        }
        updates.push("updated_at = CURRENT_TIMESTAMP".to_string());

        let sql = format!("UPDATE clients SET {} WHERE id = ?", updates.join(", "));
        let mut query = sqlx::query(&sql);
        for value in &params {
            query = query.bind(value);
        }
        let result = query.bind(numeric_id).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Delete a client. CRM mode only; cascades to transactions.
    pub async fn delete(&self, id: &str) -> AppResult<u64> {
        if self.detector.client_mode().await == SchemaMode::Banking {
            return Ok(0);
        }
        let Ok(numeric_id) = id.parse::<i64>() else {
            return Ok(0);
        };
        let result = sqlx::query("DELETE FROM clients WHERE id = ?")
            .bind(numeric_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Count clients. Banking mode counts distinct (external id, bank code)
    /// pairs and ignores the status filter.
    pub async fn count(&self, status: Option<&str>) -> AppResult<i64> {
        let count = match self.detector.client_mode().await {
            SchemaMode::Banking => {
                sqlx::query_scalar::<_, i64>(
                    "SELECT COUNT(*) FROM (SELECT DISTINCT client_id, bank_code FROM clients)",
                )
                .fetch_one(&self.pool)
                .await?
            }
            SchemaMode::Crm => match status {
                Some(status) => {
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients WHERE status = ?")
                        .bind(status)
                        .fetch_one(&self.pool)
                        .await?
                }
                None => {
                    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM clients")
                        .fetch_one(&self.pool)
                        .await?
                }
            },
        };
        Ok(count)
    }
}

/// Fill null email/phone from the configured contact pool, round-robin over
/// the client's position in the listing. Present values are never replaced.
pub fn apply_mock_contacts(clients: &mut [Client], pool: &[MockContact]) {
    if pool.is_empty() {
        return;
    }
    for (index, client) in clients.iter_mut().enumerate() {
        let contact = &pool[index % pool.len()];
        if client.email.is_none() {
            client.email = Some(contact.email.clone());
        }
        if client.phone.is_none() {
            client.phone = Some(contact.phone.clone());
        }
    }
}

fn banking_client_from_row(row: &sqlx::sqlite::SqliteRow) -> Client {
    let external_id: String = row.get("client_id");
    let bank_code: String = row.get("bank_code");
    let created_at = row
        .try_get::<Option<NaiveDateTime>, _>("created_at")
        .ok()
        .flatten();
    Client {
        id: ClientRef::composite(&external_id, &bank_code),
        name: format!("{} ({})", external_id, bank_code),
        email: None,
        phone: None,
        status: "active".to_string(),
        created_at,
        updated_at: created_at,
    }
}

fn crm_client_from_row(row: &sqlx::sqlite::SqliteRow) -> Client {
    Client {
        id: row.get::<i64, _>("id").to_string(),
        name: row.get("name"),
        email: row.get("email"),
        phone: row.get("phone"),
        status: row.get("status"),
        created_at: row
            .try_get::<Option<NaiveDateTime>, _>("created_at")
            .ok()
            .flatten(),
        updated_at: row
            .try_get::<Option<NaiveDateTime>, _>("updated_at")
            .ok()
            .flatten(),
    }
}
