use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use devloop_core::{
    CreateSessionMessage, Feedback, Project, ProjectStatus, Session, SessionMessage,
    SessionStatus, Task, TaskStatus,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::store::RecordStore;

#[derive(Default)]
struct MemoryState {
    projects: HashMap<Uuid, Project>,
    tasks: HashMap<Uuid, Task>,
    /// Insertion order is significant for "latest session" lookups.
    sessions: Vec<Session>,
    messages: Vec<SessionMessage>,
    feedback: Vec<Feedback>,
}

/// In-process [`RecordStore`]. Nothing survives the process; used for dry
/// runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create_project(&self, project: &Project) -> Result<Project> {
        let mut state = self.state.write().await;
        state.projects.insert(project.id, project.clone());
        Ok(project.clone())
    }

    async fn get_project(&self, id: Uuid) -> Result<Project> {
        let state = self.state.read().await;
        state
            .projects
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Project", id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state.projects.values().cloned().collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn update_project_status(&self, id: Uuid, status: ProjectStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Project", id))?;
        project.status = status;
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn set_capture_flags(
        &self,
        id: Uuid,
        feedback_captured: bool,
        learnings_captured: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let project = state
            .projects
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Project", id))?;
        project.feedback_captured = feedback_captured;
        project.learnings_captured = learnings_captured;
        project.updated_at = Utc::now();
        Ok(())
    }

    async fn create_task(&self, task: &Task) -> Result<Task> {
        let mut state = self.state.write().await;
        let duplicate = state
            .tasks
            .values()
            .any(|t| t.project_id == task.project_id && t.sequence == task.sequence);
        if duplicate {
            return Err(DbError::Decode(devloop_core::CoreError::Validation(
                format!("duplicate task sequence {}", task.sequence),
            )));
        }
        state.tasks.insert(task.id, task.clone());
        Ok(task.clone())
    }

    async fn get_task(&self, id: Uuid) -> Result<Task> {
        let state = self.state.read().await;
        state
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| DbError::not_found("Task", id))
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.project_id == project_id)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.sequence);
        Ok(tasks)
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Task", id))?;
        task.status = status;
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn set_task_change_id(&self, id: Uuid, change_id: Option<&str>) -> Result<()> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Task", id))?;
        task.change_id = change_id.map(str::to_string);
        task.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_task_iteration(&self, id: Uuid) -> Result<u32> {
        let mut state = self.state.write().await;
        let task = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| DbError::not_found("Task", id))?;
        task.iteration_count += 1;
        task.updated_at = Utc::now();
        Ok(task.iteration_count)
    }

    async fn create_session(&self, session: &Session) -> Result<Session> {
        let mut state = self.state.write().await;
        state.sessions.push(session.clone());
        Ok(session.clone())
    }

    async fn list_sessions(&self, task_id: Uuid) -> Result<Vec<Session>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .filter(|s| s.task_id == task_id)
            .cloned()
            .collect())
    }

    async fn latest_session(&self, task_id: Uuid) -> Result<Option<Session>> {
        let state = self.state.read().await;
        Ok(state
            .sessions
            .iter()
            .rev()
            .find(|s| s.task_id == task_id)
            .cloned())
    }

    async fn finish_session(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| DbError::not_found("Session", id))?;
        session.status = status;
        session.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn append_message(&self, message: &CreateSessionMessage) -> Result<i64> {
        let mut state = self.state.write().await;
        let id = state.messages.len() as i64 + 1;
        state.messages.push(SessionMessage {
            id,
            session_id: message.session_id,
            kind: message.kind.clone(),
            payload: message.payload.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<SessionMessage>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id)
            .cloned()
            .collect())
    }

    async fn create_feedback(&self, feedback: &Feedback) -> Result<Feedback> {
        let mut state = self.state.write().await;
        state.feedback.push(feedback.clone());
        Ok(feedback.clone())
    }

    async fn list_feedback(&self, task_id: Uuid) -> Result<Vec<Feedback>> {
        let state = self.state.read().await;
        Ok(state
            .feedback
            .iter()
            .filter(|f| f.task_id == task_id)
            .cloned()
            .collect())
    }
}
