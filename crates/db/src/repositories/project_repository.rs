use crate::error::DbError;
use crate::models::{datetime_to_timestamp, ProjectRow};
use chrono::Utc;
use devloop_core::{Project, ProjectStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

#[derive(Clone)]
pub struct ProjectRepository {
    pool: SqlitePool,
}

impl ProjectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, project: &Project) -> Result<Project, DbError> {
        let row = ProjectRow::from(project);

        sqlx::query(
            r#"
            INSERT INTO projects (id, name, plan_text, status, feedback_captured, learnings_captured, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.name)
        .bind(&row.plan_text)
        .bind(&row.status)
        .bind(row.feedback_captured)
        .bind(row.learnings_captured)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(project.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Project>, DbError> {
        let row: Option<ProjectRow> = sqlx::query_as(
            r#"
            SELECT id, name, plan_text, status, feedback_captured, learnings_captured, created_at, updated_at
            FROM projects
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    pub async fn find_all(&self) -> Result<Vec<Project>, DbError> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            r#"
            SELECT id, name, plan_text, status, feedback_captured, learnings_captured, created_at, updated_at
            FROM projects
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(DbError::from))
            .collect()
    }

    /// Returns `false` when no project has the given id.
    pub async fn update_status(&self, id: Uuid, status: ProjectStatus) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE projects SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(datetime_to_timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_capture_flags(
        &self,
        id: Uuid,
        feedback_captured: bool,
        learnings_captured: bool,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET feedback_captured = ?, learnings_captured = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(feedback_captured)
        .bind(learnings_captured)
        .bind(datetime_to_timestamp(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
