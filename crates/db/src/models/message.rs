use devloop_core::{CoreError, SessionMessage};

use super::{parse_uuid, timestamp_to_datetime};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionMessageRow {
    pub id: i64,
    pub session_id: String,
    pub kind: String,
    pub payload: String,
    pub created_at: i64,
}

impl SessionMessageRow {
    pub fn into_domain(self) -> Result<SessionMessage, CoreError> {
        // Payloads are archived verbatim; anything that no longer parses is kept as a string.
        let payload = serde_json::from_str(&self.payload)
            .unwrap_or(serde_json::Value::String(self.payload));
        Ok(SessionMessage {
            id: self.id,
            session_id: parse_uuid("session id", &self.session_id)?,
            kind: self.kind,
            payload,
            created_at: timestamp_to_datetime(self.created_at),
        })
    }
}
