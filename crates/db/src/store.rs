use async_trait::async_trait;
use devloop_core::{
    CreateSessionMessage, Feedback, Project, ProjectStatus, Session, SessionMessage,
    SessionStatus, Task, TaskStatus,
};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DbError, Result};
use crate::repositories::{
    FeedbackRepository, MessageRepository, ProjectRepository, SessionRepository, TaskRepository,
};

/// Persistence operations the engine needs. Every write is independent;
/// there are no multi-record transactions.
///
/// Lookups and updates of a missing record fail with [`DbError::NotFound`].
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn create_project(&self, project: &Project) -> Result<Project>;
    async fn get_project(&self, id: Uuid) -> Result<Project>;
    async fn list_projects(&self) -> Result<Vec<Project>>;
    async fn update_project_status(&self, id: Uuid, status: ProjectStatus) -> Result<()>;
    async fn set_capture_flags(
        &self,
        id: Uuid,
        feedback_captured: bool,
        learnings_captured: bool,
    ) -> Result<()>;

    async fn create_task(&self, task: &Task) -> Result<Task>;
    async fn get_task(&self, id: Uuid) -> Result<Task>;
    /// Tasks of a project ordered by sequence.
    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>>;
    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<()>;
    async fn set_task_change_id(&self, id: Uuid, change_id: Option<&str>) -> Result<()>;
    /// Returns the counter after the increment.
    async fn increment_task_iteration(&self, id: Uuid) -> Result<u32>;

    async fn create_session(&self, session: &Session) -> Result<Session>;
    /// Sessions of a task in creation order.
    async fn list_sessions(&self, task_id: Uuid) -> Result<Vec<Session>>;
    async fn latest_session(&self, task_id: Uuid) -> Result<Option<Session>>;
    async fn finish_session(&self, id: Uuid, status: SessionStatus) -> Result<()>;

    async fn append_message(&self, message: &CreateSessionMessage) -> Result<i64>;
    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<SessionMessage>>;

    async fn create_feedback(&self, feedback: &Feedback) -> Result<Feedback>;
    async fn list_feedback(&self, task_id: Uuid) -> Result<Vec<Feedback>>;
}

fn found(updated: bool, entity: &'static str, id: Uuid) -> Result<()> {
    if updated {
        Ok(())
    } else {
        Err(DbError::not_found(entity, id))
    }
}

/// [`RecordStore`] backed by the SQLite repositories.
#[derive(Clone)]
pub struct SqliteStore {
    projects: ProjectRepository,
    tasks: TaskRepository,
    sessions: SessionRepository,
    messages: MessageRepository,
    feedback: FeedbackRepository,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            projects: ProjectRepository::new(pool.clone()),
            tasks: TaskRepository::new(pool.clone()),
            sessions: SessionRepository::new(pool.clone()),
            messages: MessageRepository::new(pool.clone()),
            feedback: FeedbackRepository::new(pool),
        }
    }

    /// Opens the database at `url`, applying migrations.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = crate::create_pool(url).await?;
        crate::run_migrations(&pool).await?;
        tracing::debug!(url, "record store ready");
        Ok(Self::new(pool))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn create_project(&self, project: &Project) -> Result<Project> {
        self.projects.create(project).await
    }

    async fn get_project(&self, id: Uuid) -> Result<Project> {
        self.projects
            .find_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Project", id))
    }

    async fn list_projects(&self) -> Result<Vec<Project>> {
        self.projects.find_all().await
    }

    async fn update_project_status(&self, id: Uuid, status: ProjectStatus) -> Result<()> {
        found(
            self.projects.update_status(id, status).await?,
            "Project",
            id,
        )
    }

    async fn set_capture_flags(
        &self,
        id: Uuid,
        feedback_captured: bool,
        learnings_captured: bool,
    ) -> Result<()> {
        found(
            self.projects
                .set_capture_flags(id, feedback_captured, learnings_captured)
                .await?,
            "Project",
            id,
        )
    }

    async fn create_task(&self, task: &Task) -> Result<Task> {
        self.tasks.create(task).await
    }

    async fn get_task(&self, id: Uuid) -> Result<Task> {
        self.tasks
            .find_by_id(id)
            .await?
            .ok_or_else(|| DbError::not_found("Task", id))
    }

    async fn list_tasks(&self, project_id: Uuid) -> Result<Vec<Task>> {
        self.tasks.find_by_project(project_id).await
    }

    async fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<()> {
        found(self.tasks.update_status(id, status).await?, "Task", id)
    }

    async fn set_task_change_id(&self, id: Uuid, change_id: Option<&str>) -> Result<()> {
        found(self.tasks.set_change_id(id, change_id).await?, "Task", id)
    }

    async fn increment_task_iteration(&self, id: Uuid) -> Result<u32> {
        self.tasks
            .increment_iteration(id)
            .await?
            .ok_or_else(|| DbError::not_found("Task", id))
    }

    async fn create_session(&self, session: &Session) -> Result<Session> {
        self.sessions.create(session).await
    }

    async fn list_sessions(&self, task_id: Uuid) -> Result<Vec<Session>> {
        self.sessions.find_by_task_id(task_id).await
    }

    async fn latest_session(&self, task_id: Uuid) -> Result<Option<Session>> {
        self.sessions.find_latest_by_task_id(task_id).await
    }

    async fn finish_session(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        found(self.sessions.finish(id, status).await?, "Session", id)
    }

    async fn append_message(&self, message: &CreateSessionMessage) -> Result<i64> {
        self.messages.create(message).await
    }

    async fn list_messages(&self, session_id: Uuid) -> Result<Vec<SessionMessage>> {
        self.messages.find_by_session_id(session_id).await
    }

    async fn create_feedback(&self, feedback: &Feedback) -> Result<Feedback> {
        self.feedback.create(feedback).await
    }

    async fn list_feedback(&self, task_id: Uuid) -> Result<Vec<Feedback>> {
        self.feedback.find_by_task_id(task_id, None).await
    }
}
