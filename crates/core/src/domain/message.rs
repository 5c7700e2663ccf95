use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An archived agent stream event. `payload` is opaque to the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMessage {
    pub id: i64,
    pub session_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSessionMessage {
    pub session_id: Uuid,
    pub kind: String,
    pub payload: serde_json::Value,
}

impl CreateSessionMessage {
    pub fn new(session_id: Uuid, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            session_id,
            kind: kind.into(),
            payload,
        }
    }
}
