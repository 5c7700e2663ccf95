use devloop_core::{AgentRole, CoreError, Session, SessionStatus};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime, to_u32};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SessionRow {
    pub id: String,
    pub task_id: String,
    pub role: String,
    pub iteration: i64,
    pub status: String,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl SessionRow {
    pub fn into_domain(self) -> Result<Session, CoreError> {
        Ok(Session {
            id: parse_uuid("session id", &self.id)?,
            task_id: parse_uuid("task id", &self.task_id)?,
            role: AgentRole::parse(&self.role)
                .ok_or_else(|| CoreError::unknown("agent role", &self.role))?,
            iteration: to_u32(self.iteration),
            status: SessionStatus::parse(&self.status)
                .ok_or_else(|| CoreError::unknown("session status", &self.status))?,
            started_at: timestamp_to_datetime(self.started_at),
            completed_at: self.completed_at.map(timestamp_to_datetime),
        })
    }
}

impl From<&Session> for SessionRow {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.to_string(),
            task_id: session.task_id.to_string(),
            role: session.role.as_str().to_string(),
            iteration: i64::from(session.iteration),
            status: session.status.as_str().to_string(),
            started_at: datetime_to_timestamp(session.started_at),
            completed_at: session.completed_at.map(datetime_to_timestamp),
        }
    }
}
