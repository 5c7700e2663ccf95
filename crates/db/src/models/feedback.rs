use devloop_core::{CoreError, Feedback, FeedbackKind};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime, to_u32};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedbackRow {
    pub id: String,
    pub task_id: String,
    pub iteration: i64,
    pub kind: String,
    pub content: String,
    pub created_at: i64,
}

impl FeedbackRow {
    pub fn into_domain(self) -> Result<Feedback, CoreError> {
        Ok(Feedback {
            id: parse_uuid("feedback id", &self.id)?,
            task_id: parse_uuid("task id", &self.task_id)?,
            iteration: to_u32(self.iteration),
            kind: FeedbackKind::parse(&self.kind)
                .ok_or_else(|| CoreError::unknown("feedback kind", &self.kind))?,
            content: self.content,
            created_at: timestamp_to_datetime(self.created_at),
        })
    }
}

impl From<&Feedback> for FeedbackRow {
    fn from(feedback: &Feedback) -> Self {
        Self {
            id: feedback.id.to_string(),
            task_id: feedback.task_id.to_string(),
            iteration: i64::from(feedback.iteration),
            kind: feedback.kind.as_str().to_string(),
            content: feedback.content.clone(),
            created_at: datetime_to_timestamp(feedback.created_at),
        }
    }
}
