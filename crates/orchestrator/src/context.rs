use std::sync::Arc;

use agent::{AgentRequest, AgentRunner, StreamEvent};
use db::RecordStore;
use devloop_core::{AgentRole, CreateSessionMessage, Session, SessionStatus};
use tracing::{debug, info, warn};
use uuid::Uuid;
use vcs::ChangeSetProvider;

use crate::config::EngineConfig;
use crate::error::{best_effort, Result};

/// Collaborators shared by every loop of a run.
#[derive(Clone)]
pub struct EngineContext {
    pub store: Arc<dyn RecordStore>,
    pub agents: Arc<dyn AgentRunner>,
    pub changes: Arc<dyn ChangeSetProvider>,
    pub config: EngineConfig,
}

impl EngineContext {
    pub fn new(
        store: Arc<dyn RecordStore>,
        agents: Arc<dyn AgentRunner>,
        changes: Arc<dyn ChangeSetProvider>,
    ) -> Self {
        Self {
            store,
            agents,
            changes,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run one agent invocation as a recorded session and return its text.
    ///
    /// Creating the session record is required; archiving stream events and
    /// recording the final session status are best-effort.
    pub async fn run_session(
        &self,
        task_id: Uuid,
        role: AgentRole,
        iteration: u32,
        prompt: String,
    ) -> Result<String> {
        let session = self
            .store
            .create_session(&Session::new(task_id, role, iteration))
            .await?;

        info!(
            task_id = %task_id,
            session_id = %session.id,
            role = %role,
            iteration,
            "Starting agent session"
        );

        let request = AgentRequest::new(role, prompt, self.config.working_dir.clone());
        let mut handle = match self.agents.start(request).await {
            Ok(handle) => handle,
            Err(e) => {
                self.finish_session(session.id, SessionStatus::Failed).await;
                return Err(e.into());
            }
        };

        let mut transcript = Transcript::default();
        while let Some(event) = handle.next_event().await {
            best_effort(
                self.store
                    .append_message(&CreateSessionMessage::new(
                        session.id,
                        event.kind(),
                        event.raw().clone(),
                    ))
                    .await,
                "archive agent message",
            );
            transcript.push(&event);
        }

        match handle.wait().await {
            Ok(()) => {
                self.finish_session(session.id, SessionStatus::Completed).await;
                debug!(session_id = %session.id, chars = transcript.len(), "Agent session completed");
                Ok(transcript.into_text())
            }
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Agent session failed");
                self.finish_session(session.id, SessionStatus::Failed).await;
                Err(e.into())
            }
        }
    }

    async fn finish_session(&self, session_id: Uuid, status: SessionStatus) {
        best_effort(
            self.store.finish_session(session_id, status).await,
            "finish session",
        );
    }
}

/// Accumulates the text-bearing events of one session. The final `result`
/// event repeats the last assistant message, so it is only used when no
/// streamed text arrived.
#[derive(Debug, Default)]
struct Transcript {
    texts: Vec<String>,
    result: Option<String>,
}

impl Transcript {
    fn push(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Result { text, .. } => self.result = Some(text.clone()),
            other => {
                if let Some(text) = other.text() {
                    self.texts.push(text.to_string());
                }
            }
        }
    }

    fn len(&self) -> usize {
        self.texts.iter().map(String::len).sum::<usize>()
            + self.result.as_ref().map_or(0, String::len)
    }

    fn into_text(self) -> String {
        if self.texts.is_empty() {
            self.result.unwrap_or_default()
        } else {
            self.texts.join("\n")
        }
    }
}
