//! Sequences the tasks of one project.

use std::sync::{Arc, Mutex};

use devloop_core::{ProjectStatus, Task, TaskStatus};
use events::{EventReceiver, EventSender, RunSummary, TaskLoopEvent};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::EngineContext;
use crate::error::{best_effort, OrchestratorError, Result};
use crate::implementation_loop::ImplementationLoop;

#[derive(Debug, Default)]
struct RunState {
    current_index: Option<usize>,
    pause_mode: bool,
    paused: bool,
}

struct Shared {
    state: RwLock<RunState>,
    /// Taken when the run ends, which closes the channel.
    events: Mutex<Option<EventSender<TaskLoopEvent>>>,
    continue_tx: mpsc::Sender<()>,
}

impl Shared {
    fn emit(&self, event: TaskLoopEvent) {
        let sender = match self.events.lock() {
            Ok(guard) => guard.as_ref().cloned(),
            Err(_) => None,
        };
        if let Some(sender) = sender {
            sender.send(event);
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.events.lock() {
            guard.take();
        }
    }
}

/// Outcome of [`TaskLoop::run`]. The summary is filled in even when the run
/// stops early.
#[derive(Debug)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub result: Result<()>,
}

impl RunOutcome {
    pub fn into_result(self) -> Result<RunSummary> {
        self.result.map(|()| self.summary)
    }
}

/// Handle for steering a running [`TaskLoop`] from another task.
#[derive(Clone)]
pub struct TaskLoopControl {
    shared: Arc<Shared>,
}

impl TaskLoopControl {
    pub async fn set_pause_mode(&self, enabled: bool) {
        let release = {
            let mut state = self.shared.state.write().await;
            state.pause_mode = enabled;
            !enabled && state.paused
        };
        info!(enabled, "Pause mode changed");
        self.shared
            .emit(TaskLoopEvent::PauseModeChanged { enabled });
        if release {
            let _ = self.shared.continue_tx.try_send(());
        }
    }

    /// Flip pause mode and return the new value.
    pub async fn toggle_pause_mode(&self) -> bool {
        let enabled = !self.pause_mode().await;
        self.set_pause_mode(enabled).await;
        enabled
    }

    /// Release a paused run. Does nothing when the run is not paused.
    pub async fn continue_run(&self) {
        // Send under the guard so the signal is queued before the next
        // pause can drain the channel.
        let state = self.shared.state.read().await;
        if state.paused {
            let _ = self.shared.continue_tx.try_send(());
        } else {
            debug!("Continue ignored, run is not paused");
        }
    }

    pub async fn pause_mode(&self) -> bool {
        self.shared.state.read().await.pause_mode
    }

    pub async fn is_paused(&self) -> bool {
        self.shared.state.read().await.paused
    }

    pub async fn current_index(&self) -> Option<usize> {
        self.shared.state.read().await.current_index
    }
}

pub struct TaskLoop {
    ctx: EngineContext,
    project_id: Uuid,
    shared: Arc<Shared>,
    continue_rx: mpsc::Receiver<()>,
}

impl TaskLoop {
    pub fn new(ctx: EngineContext, project_id: Uuid) -> (Self, EventReceiver<TaskLoopEvent>) {
        let (events, rx) = events::channel(ctx.config.task_event_capacity);
        let (continue_tx, continue_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared {
            state: RwLock::new(RunState {
                pause_mode: ctx.config.pause_after_task,
                ..Default::default()
            }),
            events: Mutex::new(Some(events)),
            continue_tx,
        });

        let lp = Self {
            ctx,
            project_id,
            shared,
            continue_rx,
        };
        (lp, rx)
    }

    pub fn control(&self) -> TaskLoopControl {
        TaskLoopControl {
            shared: Arc::clone(&self.shared),
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> RunOutcome {
        let mut summary = RunSummary::default();
        let result = self.run_tasks(&cancel, &mut summary).await;

        match &result {
            Ok(()) => self.shared.emit(TaskLoopEvent::Summary { summary }),
            Err(e) => self.shared.emit(TaskLoopEvent::Stopped {
                summary,
                reason: e.to_string(),
            }),
        }
        self.shared.close();

        RunOutcome { summary, result }
    }

    async fn run_tasks(&mut self, cancel: &CancellationToken, summary: &mut RunSummary) -> Result<()> {
        let project = self.ctx.store.get_project(self.project_id).await?;
        let tasks = self.ctx.store.list_tasks(self.project_id).await?;

        if tasks.is_empty() {
            info!(project_id = %self.project_id, "Project has no tasks");
            return Ok(());
        }

        self.ctx
            .store
            .update_project_status(self.project_id, ProjectStatus::InProgress)
            .await?;
        info!(
            project_id = %self.project_id,
            total_tasks = tasks.len(),
            "Starting task loop"
        );
        self.shared.emit(TaskLoopEvent::Started {
            project_id: self.project_id,
            total_tasks: tasks.len(),
        });

        let last_index = tasks.len() - 1;
        for (index, task) in tasks.into_iter().enumerate() {
            self.shared.state.write().await.current_index = Some(index);

            if cancel.is_cancelled() {
                return Err(OrchestratorError::Cancelled);
            }

            match task.status {
                TaskStatus::Completed => {
                    summary.completed += 1;
                    self.skip(index, &task);
                    continue;
                }
                TaskStatus::Failed => {
                    summary.failed += 1;
                    self.skip(index, &task);
                    continue;
                }
                TaskStatus::Escalated => {
                    summary.skipped += 1;
                    self.skip(index, &task);
                    continue;
                }
                TaskStatus::Pending | TaskStatus::InProgress => {}
            }

            self.ctx
                .store
                .update_task_status(task.id, TaskStatus::InProgress)
                .await?;
            info!(task_id = %task.id, index, title = %task.title, "Starting task");
            self.shared.emit(TaskLoopEvent::TaskStarted {
                index,
                task_id: task.id,
                title: task.title.clone(),
            });

            match self.execute(index, &task, &project.plan_text, cancel).await {
                Ok(()) => {
                    self.ctx
                        .store
                        .update_task_status(task.id, TaskStatus::Completed)
                        .await?;
                    summary.completed += 1;
                    info!(task_id = %task.id, index, "Task completed");
                    self.shared.emit(TaskLoopEvent::TaskCompleted {
                        index,
                        task_id: task.id,
                        title: task.title.clone(),
                    });
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    let escalated = e.is_escalation();
                    let status = if escalated {
                        TaskStatus::Escalated
                    } else {
                        TaskStatus::Failed
                    };
                    best_effort(
                        self.ctx.store.update_task_status(task.id, status).await,
                        "mark task failed",
                    );
                    summary.failed += 1;
                    warn!(task_id = %task.id, index, error = %e, escalated, "Task failed");
                    self.shared.emit(TaskLoopEvent::TaskFailed {
                        index,
                        task_id: task.id,
                        title: task.title.clone(),
                        message: e.to_string(),
                        escalated,
                    });

                    if !self.ctx.config.continue_on_failure() {
                        best_effort(
                            self.ctx
                                .store
                                .update_project_status(self.project_id, ProjectStatus::Failed)
                                .await,
                            "mark project failed",
                        );
                        return Err(OrchestratorError::TaskFailed {
                            title: task.title,
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if index < last_index {
                self.pause_if_requested(index, cancel).await?;
            }
        }

        let final_status = if summary.failed > 0 {
            ProjectStatus::Failed
        } else {
            ProjectStatus::Completed
        };
        self.ctx
            .store
            .update_project_status(self.project_id, final_status)
            .await?;
        info!(
            project_id = %self.project_id,
            completed = summary.completed,
            failed = summary.failed,
            skipped = summary.skipped,
            status = %final_status,
            "Task loop finished"
        );
        Ok(())
    }

    /// Open a change for the task and drive its implementation loop,
    /// relaying inner events.
    async fn execute(
        &self,
        index: usize,
        task: &Task,
        plan_text: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let change_id = self.ctx.changes.new_change(&task.title).await?;
        self.ctx
            .store
            .set_task_change_id(task.id, Some(&change_id))
            .await?;
        debug!(task_id = %task.id, change_id = %change_id, provider = self.ctx.changes.name(), "Opened change");

        let (lp, mut rx) = ImplementationLoop::new(self.ctx.clone(), task.clone(), plan_text);
        let relay = async {
            while let Some(envelope) = rx.recv().await {
                self.shared.emit(TaskLoopEvent::Loop {
                    index,
                    title: task.title.clone(),
                    event: envelope.event,
                });
            }
        };

        let (result, ()) = tokio::join!(lp.run(cancel), relay);
        result.map(|_| ())
    }

    fn skip(&self, index: usize, task: &Task) {
        debug!(task_id = %task.id, index, status = %task.status, "Skipping resolved task");
        self.shared.emit(TaskLoopEvent::TaskSkipped {
            index,
            task_id: task.id,
            title: task.title.clone(),
            status: task.status.as_str().to_string(),
        });
    }

    async fn pause_if_requested(&mut self, index: usize, cancel: &CancellationToken) -> Result<()> {
        {
            let mut state = self.shared.state.write().await;
            if !state.pause_mode {
                return Ok(());
            }
            // Signals sent before this pause must not release it.
            while self.continue_rx.try_recv().is_ok() {}
            state.paused = true;
        }

        info!(index, "Paused after task");
        self.shared.emit(TaskLoopEvent::Paused { index });

        let cancelled = tokio::select! {
            _ = self.continue_rx.recv() => false,
            _ = cancel.cancelled() => true,
        };

        self.shared.state.write().await.paused = false;
        if cancelled {
            return Err(OrchestratorError::Cancelled);
        }

        info!(index, "Resumed");
        self.shared.emit(TaskLoopEvent::Resumed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::test_support::{memory_engine, seed_project, ScriptedAgent, StaticChanges};
    use events::LoopEvent;

    async fn collect(mut rx: EventReceiver<TaskLoopEvent>) -> Vec<TaskLoopEvent> {
        let mut events = Vec::new();
        while let Some(envelope) = rx.recv().await {
            events.push(envelope.event);
        }
        events
    }

    fn engine(agents: ScriptedAgent, config: EngineConfig) -> EngineContext {
        memory_engine(Arc::new(agents), Arc::new(StaticChanges::default()), config)
    }

    #[tokio::test]
    async fn test_empty_project_completes_immediately() {
        let ctx = engine(ScriptedAgent::new(), EngineConfig::default());
        let (project, _) = seed_project(ctx.store.as_ref(), &[]).await;

        let (lp, rx) = TaskLoop::new(ctx.clone(), project.id);
        let outcome = lp.run(CancellationToken::new()).await;

        assert_eq!(outcome.into_result().unwrap(), RunSummary::default());
        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![TaskLoopEvent::Summary {
                summary: RunSummary::default()
            }]
        );
    }

    #[tokio::test]
    async fn test_resolved_tasks_are_counted_not_rerun() {
        let agents = ScriptedAgent::new();
        let config = EngineConfig::default().with_max_retries(1);
        let ctx = engine(agents, config);
        let (project, tasks) =
            seed_project(ctx.store.as_ref(), &["done", "broken", "stuck", "todo"]).await;
        for (task, status) in tasks.iter().zip([
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Escalated,
        ]) {
            ctx.store.update_task_status(task.id, status).await.unwrap();
        }

        let (lp, rx) = TaskLoop::new(ctx.clone(), project.id);
        let outcome = lp.run(CancellationToken::new()).await;
        let summary = outcome.into_result().unwrap();

        assert_eq!(
            summary,
            RunSummary {
                completed: 2,
                failed: 1,
                skipped: 1
            }
        );
        let project = ctx.store.get_project(project.id).await.unwrap();
        assert_eq!(project.status, ProjectStatus::Failed);

        let started: Vec<usize> = collect(rx)
            .await
            .into_iter()
            .filter_map(|e| match e {
                TaskLoopEvent::TaskStarted { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(started, vec![3]);
    }

    #[tokio::test]
    async fn test_failure_stops_run_without_retries() {
        let agents = ScriptedAgent::new().developer_failure("crashed");
        let ctx = engine(agents, EngineConfig::default());
        let (project, tasks) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;

        let (lp, _rx) = TaskLoop::new(ctx.clone(), project.id);
        let outcome = lp.run(CancellationToken::new()).await;

        assert!(matches!(
            outcome.result,
            Err(OrchestratorError::TaskFailed { .. })
        ));
        assert_eq!(outcome.summary.failed, 1);
        assert_eq!(
            ctx.store.get_task(tasks[0].id).await.unwrap().status,
            TaskStatus::Failed
        );
        assert_eq!(
            ctx.store.get_task(tasks[1].id).await.unwrap().status,
            TaskStatus::Pending
        );
        assert_eq!(
            ctx.store.get_project(project.id).await.unwrap().status,
            ProjectStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_escalation_continues_with_retries() {
        let agents = ScriptedAgent::new()
            .reviewer_reply("FEEDBACK: no")
            .reviewer_reply("FEEDBACK: still no");
        let config = EngineConfig::default()
            .with_max_iterations(2)
            .with_max_retries(1);
        let ctx = engine(agents, config);
        let (project, tasks) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;

        let (lp, rx) = TaskLoop::new(ctx.clone(), project.id);
        let outcome = lp.run(CancellationToken::new()).await;
        let summary = outcome.into_result().unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.failed, 1);
        let first = ctx.store.get_task(tasks[0].id).await.unwrap();
        assert_eq!(first.status, TaskStatus::Escalated);
        assert_eq!(first.iteration_count, 2);
        assert_eq!(first.change_id.as_deref(), Some("change-1"));

        let events = collect(rx).await;
        assert!(events.iter().any(|e| matches!(
            e,
            TaskLoopEvent::TaskFailed { index: 0, escalated: true, .. }
        )));
        assert!(events.iter().any(|e| matches!(
            e,
            TaskLoopEvent::Loop { index: 1, event: LoopEvent::Approved { .. }, .. }
        )));
    }

    #[tokio::test]
    async fn test_cancellation_leaves_task_in_progress() {
        let cancel = CancellationToken::new();
        let agents = ScriptedAgent::new().developer_cancels(cancel.clone());
        let ctx = engine(agents, EngineConfig::default());
        let (project, tasks) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;

        let (lp, rx) = TaskLoop::new(ctx.clone(), project.id);
        let outcome = lp.run(cancel).await;

        assert!(outcome.result.as_ref().unwrap_err().is_cancelled());
        assert_eq!(
            ctx.store.get_task(tasks[0].id).await.unwrap().status,
            TaskStatus::InProgress
        );
        assert_eq!(
            ctx.store.get_project(project.id).await.unwrap().status,
            ProjectStatus::InProgress
        );
        let events = collect(rx).await;
        assert!(matches!(events.last(), Some(TaskLoopEvent::Stopped { .. })));
    }

    #[tokio::test]
    async fn test_cancel_during_last_review_is_not_escalation() {
        let cancel = CancellationToken::new();
        let agents = ScriptedAgent::new().reviewer_cancels(cancel.clone(), "FEEDBACK: not yet");
        let ctx = engine(agents, EngineConfig::default().with_max_iterations(1));
        let (project, tasks) = seed_project(ctx.store.as_ref(), &["a"]).await;

        let (lp, _rx) = TaskLoop::new(ctx.clone(), project.id);
        let outcome = lp.run(cancel).await;

        assert!(outcome.result.unwrap_err().is_cancelled());
        assert_eq!(outcome.summary.failed, 0);
        assert_eq!(
            ctx.store.get_task(tasks[0].id).await.unwrap().status,
            TaskStatus::InProgress
        );
        assert_eq!(
            ctx.store.get_project(project.id).await.unwrap().status,
            ProjectStatus::InProgress
        );
    }

    #[tokio::test]
    async fn test_pause_waits_for_continue() {
        let config = EngineConfig::default().with_pause_after_task(true);
        let ctx = engine(ScriptedAgent::new(), config);
        let (project, _) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;

        let (lp, mut rx) = TaskLoop::new(ctx.clone(), project.id);
        let control = lp.control();
        let run = tokio::spawn(lp.run(CancellationToken::new()));

        loop {
            let envelope = rx.recv().await.unwrap();
            if envelope.event == (TaskLoopEvent::Paused { index: 0 }) {
                break;
            }
        }
        assert!(control.is_paused().await);
        assert_eq!(control.current_index().await, Some(0));

        control.continue_run().await;
        let outcome = run.await.unwrap();
        assert_eq!(outcome.into_result().unwrap().completed, 2);

        let rest = collect(rx).await;
        assert_eq!(rest.first(), Some(&TaskLoopEvent::Resumed));
        // No pause after the last task.
        assert!(!rest.iter().any(|e| matches!(e, TaskLoopEvent::Paused { .. })));
    }

    #[tokio::test]
    async fn test_disabling_pause_mode_releases_run() {
        let config = EngineConfig::default().with_pause_after_task(true);
        let ctx = engine(ScriptedAgent::new(), config);
        let (project, _) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;

        let (lp, mut rx) = TaskLoop::new(ctx.clone(), project.id);
        let control = lp.control();
        let run = tokio::spawn(lp.run(CancellationToken::new()));

        while let Some(envelope) = rx.recv().await {
            if matches!(envelope.event, TaskLoopEvent::Paused { .. }) {
                break;
            }
        }
        assert!(!control.toggle_pause_mode().await);

        let outcome = run.await.unwrap();
        assert!(outcome.result.is_ok());
        let rest = collect(rx).await;
        assert_eq!(
            rest.first(),
            Some(&TaskLoopEvent::PauseModeChanged { enabled: false })
        );
    }

    #[tokio::test]
    async fn test_continue_when_not_paused_is_dropped() {
        let config = EngineConfig::default().with_pause_after_task(true);
        let ctx = engine(ScriptedAgent::new(), config);
        let (project, _) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;

        let (lp, mut rx) = TaskLoop::new(ctx.clone(), project.id);
        let control = lp.control();
        // Sent before the run starts; must not pre-release the pause.
        control.continue_run().await;
        let run = tokio::spawn(lp.run(CancellationToken::new()));

        while let Some(envelope) = rx.recv().await {
            if matches!(envelope.event, TaskLoopEvent::Paused { .. }) {
                break;
            }
        }
        assert!(control.is_paused().await);

        control.continue_run().await;
        assert!(run.await.unwrap().result.is_ok());
    }

    #[tokio::test]
    async fn test_extra_continue_does_not_release_next_pause() {
        let config = EngineConfig::default().with_pause_after_task(true);
        let ctx = engine(ScriptedAgent::new(), config);
        let (project, _) = seed_project(ctx.store.as_ref(), &["a", "b", "c"]).await;

        let (lp, mut rx) = TaskLoop::new(ctx.clone(), project.id);
        let control = lp.control();
        let run = tokio::spawn(lp.run(CancellationToken::new()));

        while let Some(envelope) = rx.recv().await {
            if envelope.event == (TaskLoopEvent::Paused { index: 0 }) {
                break;
            }
        }
        control.continue_run().await;
        control.continue_run().await;

        while let Some(envelope) = rx.recv().await {
            if envelope.event == (TaskLoopEvent::Paused { index: 1 }) {
                break;
            }
        }
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(control.is_paused().await);
        assert!(!run.is_finished());

        control.continue_run().await;
        assert_eq!(run.await.unwrap().into_result().unwrap().completed, 3);
    }

    #[tokio::test]
    async fn test_cancel_while_paused() {
        let config = EngineConfig::default().with_pause_after_task(true);
        let ctx = engine(ScriptedAgent::new(), config);
        let (project, tasks) = seed_project(ctx.store.as_ref(), &["a", "b"]).await;
        let cancel = CancellationToken::new();

        let (lp, mut rx) = TaskLoop::new(ctx.clone(), project.id);
        let run = tokio::spawn(lp.run(cancel.clone()));

        while let Some(envelope) = rx.recv().await {
            if matches!(envelope.event, TaskLoopEvent::Paused { .. }) {
                break;
            }
        }
        cancel.cancel();

        let outcome = run.await.unwrap();
        assert!(outcome.result.unwrap_err().is_cancelled());
        assert_eq!(outcome.summary.completed, 1);
        assert_eq!(
            ctx.store.get_task(tasks[1].id).await.unwrap().status,
            TaskStatus::Pending
        );
    }
}
