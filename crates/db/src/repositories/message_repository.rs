use crate::error::DbError;
use crate::models::{datetime_to_timestamp, SessionMessageRow};
use chrono::Utc;
use devloop_core::{CreateSessionMessage, SessionMessage};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Append-only archive of raw agent stream events.
#[derive(Clone)]
pub struct MessageRepository {
    pool: SqlitePool,
}

impl MessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, message: &CreateSessionMessage) -> Result<i64, DbError> {
        let payload = serde_json::to_string(&message.payload)?;

        let result = sqlx::query(
            r#"
            INSERT INTO session_messages (session_id, kind, payload, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(message.session_id.to_string())
        .bind(&message.kind)
        .bind(&payload)
        .bind(datetime_to_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_session_id(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<SessionMessage>, DbError> {
        let rows: Vec<SessionMessageRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, kind, payload, created_at
            FROM session_messages
            WHERE session_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(DbError::from))
            .collect()
    }

    pub async fn count_by_session_id(&self, session_id: Uuid) -> Result<i64, DbError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM session_messages WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }
}
