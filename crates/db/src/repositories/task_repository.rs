use crate::error::DbError;
use crate::models::{datetime_to_timestamp, to_u32, TaskRow};
use chrono::Utc;
use devloop_core::{Task, TaskStatus};
use sqlx::SqlitePool;
use uuid::Uuid;

const TASK_COLUMNS: &str = "id, project_id, sequence, title, description, status, iteration_count, change_id, created_at, updated_at";

#[derive(Clone)]
pub struct TaskRepository {
    pool: SqlitePool,
}

impl TaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, task: &Task) -> Result<Task, DbError> {
        let row = TaskRow::from(task);

        sqlx::query(
            r#"
            INSERT INTO tasks (id, project_id, sequence, title, description, status, iteration_count, change_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.id)
        .bind(&row.project_id)
        .bind(row.sequence)
        .bind(&row.title)
        .bind(&row.description)
        .bind(&row.status)
        .bind(row.iteration_count)
        .bind(&row.change_id)
        .bind(row.created_at)
        .bind(row.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(task.clone())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Task>, DbError> {
        let row: Option<TaskRow> =
            sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|r| r.into_domain()).transpose()?)
    }

    /// Tasks of a project in execution order.
    pub async fn find_by_project(&self, project_id: Uuid) -> Result<Vec<Task>, DbError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE project_id = ? ORDER BY sequence ASC"
        ))
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| r.into_domain().map_err(DbError::from))
            .collect()
    }

    pub async fn update_status(&self, id: Uuid, status: TaskStatus) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(datetime_to_timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_change_id(&self, id: Uuid, change_id: Option<&str>) -> Result<bool, DbError> {
        let result = sqlx::query("UPDATE tasks SET change_id = ?, updated_at = ? WHERE id = ?")
            .bind(change_id)
            .bind(datetime_to_timestamp(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Bumps the rejection counter and returns the new value, or `None` for
    /// an unknown task.
    pub async fn increment_iteration(&self, id: Uuid) -> Result<Option<u32>, DbError> {
        let count: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE tasks
            SET iteration_count = iteration_count + 1, updated_at = ?
            WHERE id = ?
            RETURNING iteration_count
            "#,
        )
        .bind(datetime_to_timestamp(Utc::now()))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.map(to_u32))
    }
}
