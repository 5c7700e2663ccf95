//! Developer/reviewer iteration for a single task.

use devloop_core::{AgentRole, Feedback, Task};
use events::{EventReceiver, EventSender, LoopEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::EngineContext;
use crate::error::{best_effort, OrchestratorError, Result};
use crate::parser::OutputParser;
use crate::prompts::Prompts;
use crate::state_machine::{LoopStateMachine, LoopStatus};

/// Result of an approved loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopReport {
    /// Iteration in which the reviewer approved.
    pub iterations: u32,
}

/// Runs developer then reviewer until approval or until the iteration
/// budget is spent. Consumed by [`ImplementationLoop::run`]; the event
/// channel closes when the run returns.
pub struct ImplementationLoop {
    ctx: EngineContext,
    task: Task,
    plan_text: String,
    status: LoopStatus,
    iteration: u32,
    events: EventSender<LoopEvent>,
}

impl ImplementationLoop {
    pub fn new(
        ctx: EngineContext,
        task: Task,
        plan_text: impl Into<String>,
    ) -> (Self, EventReceiver<LoopEvent>) {
        let (events, rx) = events::channel(ctx.config.loop_event_capacity);
        let lp = Self {
            ctx,
            task,
            plan_text: plan_text.into(),
            status: LoopStatus::Pending,
            iteration: 0,
            events,
        };
        (lp, rx)
    }

    pub fn status(&self) -> LoopStatus {
        self.status
    }

    pub async fn run(mut self, cancel: &CancellationToken) -> Result<LoopReport> {
        if cancel.is_cancelled() {
            return self.fail(OrchestratorError::Cancelled);
        }

        self.transition(LoopStatus::Running)?;
        let max_iterations = self.ctx.config.iteration_budget();
        info!(
            task_id = %self.task.id,
            task_title = %self.task.title,
            max_iterations,
            "Starting implementation loop"
        );
        self.emit(LoopEvent::Started {
            task_id: self.task.id,
            max_iterations,
        });

        let mut feedback: Option<String> = None;
        for iteration in 1..=max_iterations {
            self.iteration = iteration;

            if cancel.is_cancelled() {
                return self.fail(OrchestratorError::Cancelled);
            }

            self.emit(LoopEvent::Developing { iteration });
            let prompt = Prompts::developer(&self.plan_text, &self.task, feedback.as_deref());
            let developer_output = match self
                .ctx
                .run_session(self.task.id, AgentRole::Developer, iteration, prompt)
                .await
            {
                Ok(output) => output,
                Err(e) => return self.fail(e),
            };
            self.record_learnings(iteration, &developer_output).await;

            if cancel.is_cancelled() {
                return self.fail(OrchestratorError::Cancelled);
            }

            let change_summary = match self.ctx.changes.show().await {
                Ok(diff) => diff,
                Err(e) => return self.fail(e.into()),
            };

            self.emit(LoopEvent::Reviewing { iteration });
            let prompt = Prompts::reviewer(&self.plan_text, &self.task, &change_summary);
            let review_output = match self
                .ctx
                .run_session(self.task.id, AgentRole::Reviewer, iteration, prompt)
                .await
            {
                Ok(output) => output,
                Err(e) => return self.fail(e),
            };

            if cancel.is_cancelled() {
                return self.fail(OrchestratorError::Cancelled);
            }

            let verdict = OutputParser::review_verdict(&review_output);
            if verdict.approved {
                self.transition(LoopStatus::Approved)?;
                info!(task_id = %self.task.id, iteration, "Reviewer approved");
                self.emit(LoopEvent::Approved { iteration });
                return Ok(LoopReport {
                    iterations: iteration,
                });
            }

            info!(task_id = %self.task.id, iteration, "Reviewer requested changes");
            self.record_rejection(iteration, &verdict.feedback).await;
            self.emit(LoopEvent::Feedback {
                iteration,
                feedback: verdict.feedback.clone(),
            });
            feedback = Some(verdict.feedback);
        }

        self.transition(LoopStatus::Escalated)?;
        let err = OrchestratorError::Escalated {
            iterations: max_iterations,
        };
        warn!(task_id = %self.task.id, max_iterations, "Escalating task");
        self.emit(LoopEvent::Failed {
            iteration: self.iteration,
            message: err.to_string(),
            escalated: true,
        });
        Err(err)
    }

    fn transition(&mut self, to: LoopStatus) -> Result<()> {
        LoopStateMachine::validate_transition(&self.status, &to)?;
        debug!(
            task_id = %self.task.id,
            from = %self.status.as_str(),
            to = %to.as_str(),
            "Loop state transition"
        );
        self.status = to;
        Ok(())
    }

    fn fail(&mut self, err: OrchestratorError) -> Result<LoopReport> {
        if !self.status.is_terminal() {
            self.transition(LoopStatus::Failed)?;
        }
        if err.is_cancelled() {
            info!(task_id = %self.task.id, iteration = self.iteration, "Implementation loop cancelled");
        } else {
            warn!(task_id = %self.task.id, iteration = self.iteration, error = %err, "Implementation loop failed");
        }
        self.emit(LoopEvent::Failed {
            iteration: self.iteration,
            message: err.to_string(),
            escalated: false,
        });
        Err(err)
    }

    async fn record_learnings(&self, iteration: u32, developer_output: &str) {
        let parsed = OutputParser::parse_for_role(developer_output, AgentRole::Developer);
        if !parsed.done {
            debug!(task_id = %self.task.id, iteration, "Developer did not report completion");
        }
        if parsed.learnings.is_empty() {
            return;
        }
        best_effort(
            self.ctx
                .store
                .create_feedback(&Feedback::learning(self.task.id, iteration, parsed.learnings))
                .await,
            "store learnings",
        );
    }

    async fn record_rejection(&self, iteration: u32, feedback: &str) {
        best_effort(
            self.ctx
                .store
                .create_feedback(&Feedback::review(self.task.id, iteration, feedback))
                .await,
            "store review feedback",
        );
        best_effort(
            self.ctx.store.increment_task_iteration(self.task.id).await,
            "increment iteration count",
        );
    }

    fn emit(&self, event: LoopEvent) {
        self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::test_support::{
        engine_with_task, memory_engine, seed_project, ScriptedAgent, StaticChanges,
    };
    use devloop_core::{SessionStatus, TaskStatus};
    use std::sync::Arc;

    async fn drain(mut rx: EventReceiver<LoopEvent>) -> Vec<LoopEvent> {
        let mut events = Vec::new();
        while let Some(envelope) = rx.recv().await {
            events.push(envelope.event);
        }
        events
    }

    #[tokio::test]
    async fn test_approval_on_first_round() {
        let agents = Arc::new(ScriptedAgent::new());
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;

        let (lp, rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let report = lp.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.iterations, 1);

        let sessions = ctx.store.list_sessions(task.id).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].role, AgentRole::Developer);
        assert_eq!(sessions[1].role, AgentRole::Reviewer);
        assert!(sessions.iter().all(|s| s.status == SessionStatus::Completed));

        let events = drain(rx).await;
        assert!(matches!(events.first(), Some(LoopEvent::Started { .. })));
        assert_eq!(events.last(), Some(&LoopEvent::Approved { iteration: 1 }));
    }

    #[tokio::test]
    async fn test_escalates_after_budget() {
        let agents = Arc::new(ScriptedAgent::new().reviewer_default("FEEDBACK: still wrong"));
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;

        let (lp, rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let err = lp.run(&CancellationToken::new()).await.unwrap_err();
        assert!(err.is_escalation());

        let stored = ctx.store.get_task(task.id).await.unwrap();
        assert_eq!(stored.iteration_count, 3);
        assert_eq!(stored.status, TaskStatus::Pending);

        let events = drain(rx).await;
        let feedback_events = events
            .iter()
            .filter(|e| matches!(e, LoopEvent::Feedback { .. }))
            .count();
        assert_eq!(feedback_events, 3);
        assert!(matches!(
            events.last(),
            Some(LoopEvent::Failed { escalated: true, iteration: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_feedback_reaches_next_developer_prompt() {
        let agents = Arc::new(
            ScriptedAgent::new()
                .reviewer_reply("FEEDBACK: handle empty input")
                .reviewer_reply("REVIEWER_APPROVED REVIEWER_APPROVED!!!"),
        );
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;

        let (lp, _rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let report = lp.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.iterations, 2);

        let prompts = agents.prompts(AgentRole::Developer).await;
        assert_eq!(prompts.len(), 2);
        assert!(!prompts[0].contains("handle empty input"));
        assert!(prompts[1].contains("handle empty input"));

        let feedback = ctx.store.list_feedback(task.id).await.unwrap();
        assert!(feedback.iter().any(|f| f.content == "handle empty input"));
        assert_eq!(ctx.store.get_task(task.id).await.unwrap().iteration_count, 1);
    }

    #[tokio::test]
    async fn test_agent_failure_is_terminal() {
        let agents = Arc::new(ScriptedAgent::new().developer_failure("exit 1"));
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;

        let (lp, rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let err = lp.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentFailed(_)));

        let sessions = ctx.store.list_sessions(task.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Failed);
        assert!(agents.prompts(AgentRole::Reviewer).await.is_empty());

        let events = drain(rx).await;
        assert!(matches!(
            events.last(),
            Some(LoopEvent::Failed { escalated: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let agents = Arc::new(ScriptedAgent::new());
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let (lp, _rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let err = lp.run(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(ctx.store.list_sessions(task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_learnings_are_recorded() {
        let agents = Arc::new(
            ScriptedAgent::new()
                .developer_reply(
                    "## Progress\nadded cache\n## Learnings\nkeys are paths\n## Status\nDEV_DONE DEV_DONE DEV_DONE!!!",
                ),
        );
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;

        let (lp, _rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        lp.run(&CancellationToken::new()).await.unwrap();

        let feedback = ctx.store.list_feedback(task.id).await.unwrap();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].kind, devloop_core::FeedbackKind::Learning);
        assert_eq!(feedback[0].content, "keys are paths");
    }

    #[tokio::test]
    async fn test_change_summary_failure_is_terminal() {
        let agents = Arc::new(ScriptedAgent::new());
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::failing())).await;

        let (lp, _rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let err = lp.run(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::ChangeSet(_)));
        assert!(agents.prompts(AgentRole::Reviewer).await.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_during_review_is_not_escalated() {
        let cancel = CancellationToken::new();
        let agents =
            Arc::new(ScriptedAgent::new().reviewer_cancels(cancel.clone(), "FEEDBACK: not yet"));
        let ctx = memory_engine(
            agents.clone(),
            Arc::new(StaticChanges::default()),
            EngineConfig::default().with_max_iterations(1),
        );
        let (_, tasks) = seed_project(ctx.store.as_ref(), &["Only task"]).await;
        let task = tasks[0].clone();

        let (lp, rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let err = lp.run(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(!err.is_escalation());

        // The rejection arrived after cancellation and is not recorded.
        assert!(ctx.store.list_feedback(task.id).await.unwrap().is_empty());
        assert_eq!(ctx.store.get_task(task.id).await.unwrap().iteration_count, 0);

        let events = drain(rx).await;
        assert!(!events.iter().any(|e| matches!(e, LoopEvent::Feedback { .. })));
        assert!(matches!(
            events.last(),
            Some(LoopEvent::Failed { escalated: false, iteration: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_during_developer_session() {
        let cancel = CancellationToken::new();
        let agents = Arc::new(ScriptedAgent::new().developer_cancels(cancel.clone()));
        let (ctx, task) = engine_with_task(agents.clone(), Arc::new(StaticChanges::default())).await;

        let (lp, rx) = ImplementationLoop::new(ctx.clone(), task.clone(), "plan");
        let err = lp.run(&cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(agents.prompts(AgentRole::Reviewer).await.is_empty());

        let sessions = ctx.store.list_sessions(task.id).await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].status, SessionStatus::Completed);

        let events = drain(rx).await;
        assert!(matches!(
            events.last(),
            Some(LoopEvent::Failed { escalated: false, iteration: 1, .. })
        ));
    }
}
