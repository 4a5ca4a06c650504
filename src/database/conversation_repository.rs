//! AI conversation audit log. Rows are written after a successful gateway
//! call and listed for the presentation layer; never updated or deleted.

use chrono::NaiveDateTime;
use sqlx::{Row, SqlitePool};

use crate::error::AppResult;
use crate::models::Conversation;

#[derive(Clone)]
pub struct ConversationRepository {
    pool: SqlitePool,
}

impl ConversationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persist one exchange. A missing client id marks a global
    /// conversation.
    pub async fn create(
        &self,
        client_id: Option<&str>,
        question: &str,
        answer: &str,
        context_data: Option<&str>,
    ) -> AppResult<i64> {
        let result = sqlx::query(
            r#"INSERT INTO ai_conversations (client_id, question, answer, context_data)
               VALUES (?, ?, ?, ?)"#,
        )
        .bind(client_id)
        .bind(question)
        .bind(answer)
        .bind(context_data)
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Conversation history for one client, newest first.
    pub async fn get_by_client(
        &self,
        client_id: &str,
        limit: i64,
    ) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"SELECT id, client_id, question, answer, context_data, created_at
               FROM ai_conversations
               WHERE client_id = ?
               ORDER BY created_at DESC
               LIMIT ?"#,
        )
        .bind(client_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }

    /// Most recent conversations across every client.
    pub async fn get_recent_global(&self, limit: i64) -> AppResult<Vec<Conversation>> {
        let rows = sqlx::query(
            r#"SELECT id, client_id, question, answer, context_data, created_at
               FROM ai_conversations
               ORDER BY created_at DESC
               LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(conversation_from_row).collect())
    }
}

fn conversation_from_row(row: &sqlx::sqlite::SqliteRow) -> Conversation {
    Conversation {
        id: row.get("id"),
        client_id: row.try_get("client_id").ok().flatten(),
        question: row.get("question"),
        answer: row.get("answer"),
        context_data: row.try_get("context_data").ok().flatten(),
        created_at: row
            .try_get::<Option<NaiveDateTime>, _>("created_at")
            .ok()
            .flatten(),
    }
}
