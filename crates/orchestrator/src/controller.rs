//! Top-level entry point: import plans, prepare a project for resuming, and
//! launch task loop runs on their own tokio task.

use devloop_core::{FeedbackKind, Project, Task};
use events::{EventReceiver, TaskLoopEvent};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{OrchestratorError, Result};
use crate::plan_parser::parse_plan;
use crate::resume::{ProjectState, ResumeDetector};
use crate::task_loop::{RunOutcome, TaskLoop, TaskLoopControl};

/// A task loop running in the background.
pub struct RunHandle {
    pub events: EventReceiver<TaskLoopEvent>,
    pub control: TaskLoopControl,
    join: JoinHandle<RunOutcome>,
}

impl RunHandle {
    /// Wait for the run to end.
    pub async fn finish(self) -> Result<RunOutcome> {
        self.join
            .await
            .map_err(|e| OrchestratorError::Aborted(e.to_string()))
    }

    /// Split into the event receiver and a handle that waits for the run.
    pub fn into_parts(self) -> (EventReceiver<TaskLoopEvent>, TaskLoopControl, RunJoin) {
        (self.events, self.control, RunJoin { join: self.join })
    }
}

pub struct RunJoin {
    join: JoinHandle<RunOutcome>,
}

impl RunJoin {
    pub async fn finish(self) -> Result<RunOutcome> {
        self.join
            .await
            .map_err(|e| OrchestratorError::Aborted(e.to_string()))
    }
}

/// Review feedback and developer learnings gathered across a project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotesDigest {
    pub feedback: String,
    pub learnings: String,
}

pub struct Controller {
    ctx: EngineContext,
    detector: ResumeDetector,
}

impl Controller {
    pub fn new(ctx: EngineContext) -> Self {
        let detector = ResumeDetector::new(ctx.store.clone());
        Self { ctx, detector }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn detector(&self) -> &ResumeDetector {
        &self.detector
    }

    /// Create a project from a markdown plan, one task per plan section.
    pub async fn import_plan(&self, name: &str, plan_text: &str) -> Result<(Project, Vec<Task>)> {
        if plan_text.trim().is_empty() {
            return Err(OrchestratorError::InvalidPlan("plan is empty".to_string()));
        }

        let parsed = parse_plan(plan_text);
        let project = self
            .ctx
            .store
            .create_project(&Project::new(name, plan_text))
            .await?;

        let mut tasks = Vec::with_capacity(parsed.tasks.len());
        for planned in parsed.tasks {
            let task = Task::new(
                project.id,
                planned.sequence,
                planned.title,
                planned.description,
            );
            tasks.push(self.ctx.store.create_task(&task).await?);
        }

        info!(project_id = %project.id, name, tasks = tasks.len(), "Imported plan");
        Ok((project, tasks))
    }

    /// Detect the project's state and clean up after an interrupted run.
    /// Returns the state as it is after cleanup.
    pub async fn prepare(&self, project_id: Uuid) -> Result<ProjectState> {
        let state = self.detector.detect_state(project_id).await?;
        if !state.needs_cleanup {
            return Ok(state);
        }

        info!(project_id = %project_id, kind = %state.kind, "Cleaning up interrupted run");
        self.detector.cleanup_for_resume(&state).await?;
        self.detector.detect_state(project_id).await
    }

    /// Spawn a task loop for the project.
    pub fn start(&self, project_id: Uuid, cancel: CancellationToken) -> RunHandle {
        let (task_loop, events) = TaskLoop::new(self.ctx.clone(), project_id);
        let control = task_loop.control();
        let join = tokio::spawn(task_loop.run(cancel));

        debug!(project_id = %project_id, "Task loop spawned");
        RunHandle {
            events,
            control,
            join,
        }
    }

    /// Compile per-task review feedback and learnings, then mark both as
    /// captured on the project.
    pub async fn capture_notes(&self, project_id: Uuid) -> Result<NotesDigest> {
        let tasks = self.ctx.store.list_tasks(project_id).await?;

        let mut digest = NotesDigest::default();
        for task in &tasks {
            let notes = self.ctx.store.list_feedback(task.id).await?;
            let render = |kind: FeedbackKind| {
                notes
                    .iter()
                    .filter(|n| n.kind == kind)
                    .map(|n| format!("- (iteration {}) {}\n", n.iteration, n.content.trim()))
                    .collect::<String>()
            };

            for (kind, out) in [
                (FeedbackKind::Review, &mut digest.feedback),
                (FeedbackKind::Learning, &mut digest.learnings),
            ] {
                let items = render(kind);
                if !items.is_empty() {
                    out.push_str(&format!("### Task {}: {}\n{}\n", task.sequence, task.title, items));
                }
            }
        }

        self.ctx
            .store
            .set_capture_flags(project_id, true, true)
            .await?;
        info!(
            project_id = %project_id,
            has_feedback = !digest.feedback.is_empty(),
            has_learnings = !digest.learnings.is_empty(),
            "Captured project notes"
        );
        Ok(digest)
    }
}
