use devloop_core::{CoreError, Task, TaskStatus};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime, to_u32};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: String,
    pub project_id: String,
    pub sequence: i64,
    pub title: String,
    pub description: String,
    pub status: String,
    pub iteration_count: i64,
    pub change_id: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    pub fn into_domain(self) -> Result<Task, CoreError> {
        Ok(Task {
            id: parse_uuid("task id", &self.id)?,
            project_id: parse_uuid("project id", &self.project_id)?,
            sequence: to_u32(self.sequence),
            title: self.title,
            description: self.description,
            status: TaskStatus::parse(&self.status)
                .ok_or_else(|| CoreError::unknown("task status", &self.status))?,
            iteration_count: to_u32(self.iteration_count),
            change_id: self.change_id,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            project_id: task.project_id.to_string(),
            sequence: i64::from(task.sequence),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status.as_str().to_string(),
            iteration_count: i64::from(task.iteration_count),
            change_id: task.change_id.clone(),
            created_at: datetime_to_timestamp(task.created_at),
            updated_at: datetime_to_timestamp(task.updated_at),
        }
    }
}
