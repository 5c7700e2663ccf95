use devloop_core::{CoreError, Project, ProjectStatus};

use super::{datetime_to_timestamp, parse_uuid, timestamp_to_datetime};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProjectRow {
    pub id: String,
    pub name: String,
    pub plan_text: String,
    pub status: String,
    pub feedback_captured: bool,
    pub learnings_captured: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ProjectRow {
    pub fn into_domain(self) -> Result<Project, CoreError> {
        Ok(Project {
            id: parse_uuid("project id", &self.id)?,
            name: self.name,
            plan_text: self.plan_text,
            status: ProjectStatus::parse(&self.status)
                .ok_or_else(|| CoreError::unknown("project status", &self.status))?,
            feedback_captured: self.feedback_captured,
            learnings_captured: self.learnings_captured,
            created_at: timestamp_to_datetime(self.created_at),
            updated_at: timestamp_to_datetime(self.updated_at),
        })
    }
}

impl From<&Project> for ProjectRow {
    fn from(project: &Project) -> Self {
        Self {
            id: project.id.to_string(),
            name: project.name.clone(),
            plan_text: project.plan_text.clone(),
            status: project.status.as_str().to_string(),
            feedback_captured: project.feedback_captured,
            learnings_captured: project.learnings_captured,
            created_at: datetime_to_timestamp(project.created_at),
            updated_at: datetime_to_timestamp(project.updated_at),
        }
    }
}
