use crate::error::DbError;
use crate::models::FeedbackRow;
use devloop_core::{Feedback, FeedbackKind};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct FeedbackRepository {
    pool: SqlitePool,
}

impl FeedbackRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, feedback: &Feedback) -> Result<Feedback, DbError> {
        let row = FeedbackRow::from(feedback);

        sqlx::query(
            r#"
            INSERT INTO feedback (id, task_id, iteration, kind, content, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.task_id)
        .bind(row.iteration)
        .bind(&row.kind)
        .bind(&row.content)
        .bind(row.created_at)
        .execute(&self.pool)
        .await?;

        Ok(feedback.clone())
    }

    /// Feedback for a task in insertion order, optionally narrowed to one kind.
    pub async fn find_by_task_id(
        &self,
        task_id: Uuid,
        kind: Option<FeedbackKind>,
    ) -> Result<Vec<Feedback>, DbError> {
        let rows: Vec<FeedbackRow> = sqlx::query_as(
            r#"
            SELECT id, task_id, iteration, kind, content, created_at
            FROM feedback
            WHERE task_id = ? AND (? IS NULL OR kind = ?)
            ORDER BY rowid ASC
            "#,
        )
        .bind(task_id.to_string())
        .bind(kind.map(|k| k.as_str()))
        .bind(kind.map(|k| k.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(DbError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, ProjectRepository, TaskRepository};
    use devloop_core::{Project, Task};

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
    async fn test_feedback_filtering_by_kind() {
        let (pool, task_id) = setup_test_db().await;
        let repo = FeedbackRepository::new(pool);

        repo.create(&Feedback::review(task_id, 1, "missing tests"))
            .await
            .unwrap();
        repo.create(&Feedback::learning(task_id, 1, "config lives in toml"))
            .await
            .unwrap();
        repo.create(&Feedback::review(task_id, 2, "still failing"))
            .await
            .unwrap();

        let all = repo.find_by_task_id(task_id, None).await.unwrap();
        assert_eq!(all.len(), 3);

        let reviews = repo
            .find_by_task_id(task_id, Some(FeedbackKind::Review))
            .await
            .unwrap();
        assert_eq!(reviews.len(), 2);
        assert_eq!(reviews[0].content, "missing tests");
        assert_eq!(reviews[1].iteration, 2);

        let learnings = repo
            .find_by_task_id(task_id, Some(FeedbackKind::Learning))
            .await
            .unwrap();
        assert_eq!(learnings.len(), 1);
    }
}
