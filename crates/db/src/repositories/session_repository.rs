use crate::error::DbError;
use crate::models::{datetime_to_timestamp, SessionRow};
use chrono::Utc;
use devloop_core::{Session, SessionStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, session: &Session) -> Result<Session, DbError> {
        let row = SessionRow::from(session);

        sqlx::query(
            r#"
            INSERT INTO sessions (id, task_id, role, iteration, status, started_at, completed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.task_id)
        .bind(&row.role)
        .bind(row.iteration)
        .bind(&row.status)
        .bind(row.started_at)
        .bind(row.completed_at)
        .execute(&self.pool)
        .await?;

        Ok(session.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Session>, DbError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, task_id, role, iteration, status, started_at, completed_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    /// Sessions of a task in creation order.
    pub async fn find_by_task_id(&self, task_id: Uuid) -> Result<Vec<Session>, DbError> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, task_id, role, iteration, status, started_at, completed_at
            FROM sessions
            WHERE task_id = ?
            ORDER BY rowid ASC
            "#,
        )
        .bind(task_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(DbError::from))
            .collect()
    }

    pub async fn find_latest_by_task_id(&self, task_id: Uuid) -> Result<Option<Session>, DbError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, task_id, role, iteration, status, started_at, completed_at
            FROM sessions
            WHERE task_id = ?
            ORDER BY rowid DESC
            LIMIT 1
            "#,
        )
        .bind(task_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    /// Records the final status and completion time of a session.
    pub async fn finish(&self, id: Uuid, status: SessionStatus) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE sessions SET status = ?, completed_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(datetime_to_timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, ProjectRepository, TaskRepository};
    use devloop_core::{AgentRole, Project, Task};

    async fn setup_test_db() -> (SqlitePool, Uuid) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let project = Project::new("demo", "");
        ProjectRepository::new(pool.clone())
            .create(&project)
            .await
            .unwrap();
        let task = Task::new(project.id, 1, "a", "");
        TaskRepository::new(pool.clone()).create(&task).await.unwrap();
        (pool, task.id)
    }

    #[tokio::test]
    async fn test_create_and_find_session() {
        let (pool, task_id) = setup_test_db().await;
        let repo = SessionRepository::new(pool);

        let session = Session::new(task_id, AgentRole::Developer, 1);
        repo.create(&session).await.unwrap();

        let found = repo.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(found.role, AgentRole::Developer);
        assert_eq!(found.iteration, 1);
        assert!(found.is_running());
    }

    #[tokio::test]
    async fn test_latest_session_follows_insertion_order() {
        let (pool, task_id) = setup_test_db().await;
        let repo = SessionRepository::new(pool);

        let dev = Session::new(task_id, AgentRole::Developer, 1);
        let review = Session::new(task_id, AgentRole::Reviewer, 1);
        repo.create(&dev).await.unwrap();
        repo.create(&review).await.unwrap();

        let latest = repo.find_latest_by_task_id(task_id).await.unwrap().unwrap();
        assert_eq!(latest.id, review.id);
        assert_eq!(repo.find_by_task_id(task_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_finish_session() {
        let (pool, task_id) = setup_test_db().await;
        let repo = SessionRepository::new(pool);
        let session = Session::new(task_id, AgentRole::Reviewer, 2);
        repo.create(&session).await.unwrap();

        assert!(repo
            .finish(session.id, SessionStatus::Failed)
            .await
            .unwrap());

        let found = repo.find_by_id(session.id).await.unwrap().unwrap();
        assert_eq!(found.status, SessionStatus::Failed);
        assert!(found.completed_at.is_some());
        assert!(!repo
            .finish(Uuid::new_v4(), SessionStatus::Completed)
            .await
            .unwrap());
    }
}
