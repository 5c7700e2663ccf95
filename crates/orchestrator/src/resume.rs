//! Crash recovery: classify a project's persisted state and repair
//! in-progress markers left behind by an interrupted run.

use std::sync::Arc;

use db::RecordStore;
use devloop_core::{Project, ProjectStatus, Session, SessionStatus, Task, TaskStatus};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStateKind {
    /// Nothing has started yet.
    Pending,
    /// Work remains and at least one task has started or finished.
    Interrupted,
    Complete,
    /// No work remains and at least one task failed or escalated.
    Failed,
}

impl ProjectStateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Interrupted => "interrupted",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ProjectStateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a project as found in the store.
#[derive(Debug, Clone)]
pub struct ProjectState {
    pub project: Project,
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    /// Failed and escalated tasks.
    pub failed: usize,
    /// First `in_progress` task by sequence.
    pub in_progress_task: Option<Task>,
    /// Further `in_progress` tasks; only a crash leaves more than one.
    pub stray_tasks: Vec<Task>,
    /// Latest session of `in_progress_task`.
    pub last_session: Option<Session>,
    pub needs_cleanup: bool,
    pub kind: ProjectStateKind,
}

impl ProjectState {
    pub fn remaining(&self) -> usize {
        self.pending + self.in_progress
    }
}

pub struct ResumeDetector {
    store: Arc<dyn RecordStore>,
}

impl ResumeDetector {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn detect_state(&self, project_id: Uuid) -> Result<ProjectState> {
        let project = self.store.get_project(project_id).await?;
        let tasks = self.store.list_tasks(project_id).await?;

        let mut state = ProjectState {
            project,
            total: tasks.len(),
            pending: 0,
            in_progress: 0,
            completed: 0,
            failed: 0,
            in_progress_task: None,
            stray_tasks: Vec::new(),
            last_session: None,
            needs_cleanup: false,
            kind: ProjectStateKind::Pending,
        };

        for task in tasks {
            match task.status {
                TaskStatus::Pending => state.pending += 1,
                TaskStatus::Completed => state.completed += 1,
                TaskStatus::Failed | TaskStatus::Escalated => state.failed += 1,
                TaskStatus::InProgress => {
                    state.in_progress += 1;
                    if state.in_progress_task.is_none() {
                        state.in_progress_task = Some(task);
                    } else {
                        state.stray_tasks.push(task);
                    }
                }
            }
        }

        if let Some(task) = &state.in_progress_task {
            state.last_session = self.store.latest_session(task.id).await?;
            if state
                .last_session
                .as_ref()
                .is_some_and(|s| s.status == SessionStatus::Running)
            {
                state.needs_cleanup = true;
            }
        }
        if !state.stray_tasks.is_empty() {
            warn!(
                project_id = %project_id,
                count = state.stray_tasks.len() + 1,
                "More than one task in progress"
            );
            state.needs_cleanup = true;
        }

        state.kind = classify(&state);
        debug!(
            project_id = %project_id,
            kind = %state.kind,
            pending = state.pending,
            in_progress = state.in_progress,
            completed = state.completed,
            failed = state.failed,
            needs_cleanup = state.needs_cleanup,
            "Detected project state"
        );
        Ok(state)
    }

    /// Reset the interrupted task to pending and fail its orphaned
    /// session. No-op unless `state.needs_cleanup`.
    pub async fn cleanup_for_resume(&self, state: &ProjectState) -> Result<()> {
        if !state.needs_cleanup {
            return Ok(());
        }

        if let Some(task) = &state.in_progress_task {
            self.store
                .update_task_status(task.id, TaskStatus::Pending)
                .await?;
            info!(task_id = %task.id, title = %task.title, "Reset interrupted task");
        }
        for task in &state.stray_tasks {
            self.store
                .update_task_status(task.id, TaskStatus::Pending)
                .await?;
            info!(task_id = %task.id, title = %task.title, "Reset stray in-progress task");
        }
        if let Some(session) = state.last_session.as_ref().filter(|s| s.is_running()) {
            self.store
                .finish_session(session.id, SessionStatus::Failed)
                .await?;
            info!(session_id = %session.id, "Marked orphaned session failed");
        }
        Ok(())
    }

    /// Every task back to pending. Change ids are kept.
    pub async fn reset_project(&self, project_id: Uuid) -> Result<()> {
        let tasks = self.store.list_tasks(project_id).await?;
        for task in &tasks {
            if task.status != TaskStatus::Pending {
                self.store
                    .update_task_status(task.id, TaskStatus::Pending)
                    .await?;
            }
        }
        self.store
            .update_project_status(project_id, ProjectStatus::Pending)
            .await?;
        self.store.set_capture_flags(project_id, false, false).await?;

        info!(project_id = %project_id, tasks = tasks.len(), "Reset project");
        Ok(())
    }

    /// Failed and escalated tasks back to pending. Returns how many were
    /// reset.
    pub async fn retry_failed_tasks(&self, project_id: Uuid) -> Result<usize> {
        let project = self.store.get_project(project_id).await?;
        let tasks = self.store.list_tasks(project_id).await?;

        let mut reset = 0;
        for task in tasks.iter().filter(|t| t.status.is_failure()) {
            self.store
                .update_task_status(task.id, TaskStatus::Pending)
                .await?;
            reset += 1;
        }

        if matches!(
            project.status,
            ProjectStatus::Failed | ProjectStatus::Completed
        ) {
            self.store
                .update_project_status(project_id, ProjectStatus::Pending)
                .await?;
        }

        info!(project_id = %project_id, reset, "Retrying failed tasks");
        Ok(reset)
    }

    pub async fn is_resumable(&self, project_id: Uuid) -> Result<bool> {
        let tasks = self.store.list_tasks(project_id).await?;
        Ok(tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress)))
    }
}

fn classify(state: &ProjectState) -> ProjectStateKind {
    if state.remaining() == 0 {
        if state.failed > 0 {
            ProjectStateKind::Failed
        } else {
            ProjectStateKind::Complete
        }
    } else if state.in_progress > 0 || state.completed > 0 || state.failed > 0 {
        ProjectStateKind::Interrupted
    } else {
        ProjectStateKind::Pending
    }
}
