//! Scripted collaborators for exercising the engine without real agents or
//! version control.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use agent::{AgentError, AgentRequest, AgentRunner, AgentSession, StreamEvent};
use async_trait::async_trait;
use db::{MemoryStore, RecordStore};
use devloop_core::{AgentRole, Project, Task};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::context::EngineContext;
use crate::markers;

pub fn developer_done_reply() -> String {
    format!("## Progress\nImplemented the task.\n\n## Status\n{}", markers::DEV_DONE)
}

pub fn approval_reply() -> String {
    format!("Looks good.\n{}", markers::REVIEWER_APPROVED)
}

#[derive(Debug, Clone)]
enum Step {
    Reply(String),
    Fail(String),
    CancelThenReply(CancellationToken, String),
}

struct RoleScript {
    queue: VecDeque<Step>,
    fallback: String,
    prompts: Vec<String>,
}

impl RoleScript {
    fn new(fallback: String) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
            prompts: Vec::new(),
        }
    }
}

/// Replays queued replies per role, then falls back to a fixed reply
/// (developer: done, reviewer: approved).
pub struct ScriptedAgent {
    scripts: Mutex<HashMap<AgentRole, RoleScript>>,
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedAgent {
    pub fn new() -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(AgentRole::Developer, RoleScript::new(developer_done_reply()));
        scripts.insert(AgentRole::Reviewer, RoleScript::new(approval_reply()));
        Self {
            scripts: Mutex::new(scripts),
        }
    }

    fn push(mut self, role: AgentRole, step: Step) -> Self {
        if let Some(script) = self.scripts.get_mut().get_mut(&role) {
            script.queue.push_back(step);
        }
        self
    }

    fn set_fallback(mut self, role: AgentRole, reply: String) -> Self {
        if let Some(script) = self.scripts.get_mut().get_mut(&role) {
            script.fallback = reply;
        }
        self
    }

    pub fn developer_reply(self, reply: impl Into<String>) -> Self {
        self.push(AgentRole::Developer, Step::Reply(reply.into()))
    }

    pub fn developer_failure(self, message: impl Into<String>) -> Self {
        self.push(AgentRole::Developer, Step::Fail(message.into()))
    }

    /// The next developer call cancels `token` and then replies normally.
    pub fn developer_cancels(self, token: CancellationToken) -> Self {
        self.push(
            AgentRole::Developer,
            Step::CancelThenReply(token, developer_done_reply()),
        )
    }

    pub fn reviewer_reply(self, reply: impl Into<String>) -> Self {
        self.push(AgentRole::Reviewer, Step::Reply(reply.into()))
    }

    /// The next reviewer call cancels `token` and then replies with `reply`.
    pub fn reviewer_cancels(self, token: CancellationToken, reply: impl Into<String>) -> Self {
        self.push(
            AgentRole::Reviewer,
            Step::CancelThenReply(token, reply.into()),
        )
    }

    pub fn reviewer_failure(self, message: impl Into<String>) -> Self {
        self.push(AgentRole::Reviewer, Step::Fail(message.into()))
    }

    pub fn reviewer_default(self, reply: impl Into<String>) -> Self {
        self.set_fallback(AgentRole::Reviewer, reply.into())
    }

    /// Prompts received so far for `role`, in call order.
    pub async fn prompts(&self, role: AgentRole) -> Vec<String> {
        self.scripts
            .lock()
            .await
            .get(&role)
            .map(|s| s.prompts.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn start(&self, request: AgentRequest) -> agent::Result<AgentSession> {
        let step = {
            let mut scripts = self.scripts.lock().await;
            let script = scripts
                .get_mut(&request.role)
                .ok_or_else(|| AgentError::Spawn(format!("no script for {}", request.role)))?;
            script.prompts.push(request.prompt);
            script
                .queue
                .pop_front()
                .unwrap_or_else(|| Step::Reply(script.fallback.clone()))
        };

        Ok(match step {
            Step::Reply(text) => AgentSession::replay(vec![StreamEvent::text_line(text)], Ok(())),
            Step::CancelThenReply(token, text) => {
                token.cancel();
                AgentSession::replay(vec![StreamEvent::text_line(text)], Ok(()))
            }
            Step::Fail(message) => AgentSession::replay(
                vec![StreamEvent::text_line("partial output")],
                Err(AgentError::Exited {
                    code: 1,
                    stderr: message,
                }),
            ),
        })
    }
}

/// Hands out sequential change ids and a fixed diff.
pub struct StaticChanges {
    diff: String,
    counter: AtomicUsize,
    fail_show: bool,
}

impl Default for StaticChanges {
    fn default() -> Self {
        Self::new("+ fn feature() {}")
    }
}

impl StaticChanges {
    pub fn new(diff: impl Into<String>) -> Self {
        Self {
            diff: diff.into(),
            counter: AtomicUsize::new(0),
            fail_show: false,
        }
    }

    /// A provider whose `show` always fails.
    pub fn failing() -> Self {
        Self {
            fail_show: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl vcs::ChangeSetProvider for StaticChanges {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn new_change(&self, _title: &str) -> vcs::Result<String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("change-{n}"))
    }

    async fn show(&self) -> vcs::Result<String> {
        if self.fail_show {
            return Err(vcs::VcsError::CommandFailed("diff unavailable".into()));
        }
        Ok(self.diff.clone())
    }
}

/// Engine over a fresh [`MemoryStore`].
pub fn memory_engine(
    agents: Arc<dyn AgentRunner>,
    changes: Arc<dyn vcs::ChangeSetProvider>,
    config: EngineConfig,
) -> EngineContext {
    EngineContext::new(Arc::new(MemoryStore::new()), agents, changes).with_config(config)
}

/// Create a project whose tasks are titled `titles`, in order.
pub async fn seed_project(store: &dyn RecordStore, titles: &[&str]) -> (Project, Vec<Task>) {
    let project = store
        .create_project(&Project::new("test project", "# Plan"))
        .await
        .unwrap_or_else(|e| panic!("create project: {e}"));

    let mut tasks = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        let task = Task::new(project.id, i as u32 + 1, *title, format!("Do {title}"));
        let task = store
            .create_task(&task)
            .await
            .unwrap_or_else(|e| panic!("create task: {e}"));
        tasks.push(task);
    }
    (project, tasks)
}

/// Engine with one seeded task, using default config.
pub async fn engine_with_task(
    agents: Arc<dyn AgentRunner>,
    changes: Arc<dyn vcs::ChangeSetProvider>,
) -> (EngineContext, Task) {
    let ctx = memory_engine(agents, changes, EngineConfig::default());
    let (_, mut tasks) = seed_project(ctx.store.as_ref(), &["Only task"]).await;
    (ctx, tasks.remove(0))
}
