use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    /// Review budget exhausted without approval.
    Escalated,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Escalated => "escalated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "escalated" => Some(Self::Escalated),
            _ => None,
        }
    }

    /// `Failed` and `Escalated` both count as failures for retry and tallies.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Escalated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Escalated)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Execution order within the project; unique per project.
    pub sequence: u32,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    /// Number of rejected review rounds. Advisory only.
    pub iteration_count: u32,
    pub change_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        project_id: Uuid,
        sequence: u32,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            project_id,
            sequence,
            title: title.into(),
            description: description.into(),
            status: TaskStatus::default(),
            iteration_count: 0,
            change_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_creation() {
        let project_id = Uuid::new_v4();
        let task = Task::new(project_id, 1, "Test Task", "Test Description");

        assert_eq!(task.project_id, project_id);
        assert_eq!(task.sequence, 1);
        assert_eq!(task.title, "Test Task");
        assert_eq!(task.description, "Test Description");
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.iteration_count, 0);
        assert!(task.change_id.is_none());
    }

    #[test]
    fn test_task_status_serialization() {
        assert_eq!(TaskStatus::Pending.as_str(), "pending");
        assert_eq!(TaskStatus::InProgress.as_str(), "in_progress");
        assert_eq!(TaskStatus::Escalated.as_str(), "escalated");
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
    }

    #[test]
    fn test_task_status_parsing() {
        assert_eq!(TaskStatus::parse("pending"), Some(TaskStatus::Pending));
        assert_eq!(TaskStatus::parse("escalated"), Some(TaskStatus::Escalated));
        assert_eq!(TaskStatus::parse("invalid"), None);
    }

    #[test]
    fn test_escalated_counts_as_failure() {
        assert!(TaskStatus::Escalated.is_failure());
        assert!(TaskStatus::Failed.is_failure());
        assert!(!TaskStatus::Completed.is_failure());
        assert!(TaskStatus::Escalated.is_terminal());
        assert!(!TaskStatus::InProgress.is_terminal());
    }

    #[test]
    fn test_task_builders() {
        let id = Uuid::new_v4();
        let task = Task::new(Uuid::new_v4(), 2, "Test", "Description")
            .with_id(id)
            .with_status(TaskStatus::Failed);

        assert_eq!(task.id, id);
        assert_eq!(task.status, TaskStatus::Failed);
    }
}
