use std::path::PathBuf;

use async_trait::async_trait;
use devloop_core::AgentRole;
use tokio::sync::{mpsc, oneshot};

use crate::error::{AgentError, Result};
use crate::events::StreamEvent;

#[derive(Debug, Clone)]
pub struct AgentRequest {
    pub role: AgentRole,
    pub prompt: String,
    pub working_dir: PathBuf,
}

impl AgentRequest {
    pub fn new(role: AgentRole, prompt: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
            working_dir: working_dir.into(),
        }
    }
}

/// Starts agent invocations.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn start(&self, request: AgentRequest) -> Result<AgentSession>;
}

/// Live handle on one agent invocation: a finite event stream followed by a
/// terminal outcome.
pub struct AgentSession {
    events: mpsc::Receiver<StreamEvent>,
    outcome: oneshot::Receiver<Result<()>>,
}

impl AgentSession {
    pub fn new(events: mpsc::Receiver<StreamEvent>, outcome: oneshot::Receiver<Result<()>>) -> Self {
        Self { events, outcome }
    }

    /// A session that replays `events` and then finishes with `outcome`.
    pub fn replay(events: Vec<StreamEvent>, outcome: Result<()>) -> Self {
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            // Capacity covers every event.
            let _ = tx.try_send(event);
        }
        let (done_tx, done_rx) = oneshot::channel();
        let _ = done_tx.send(outcome);
        Self::new(rx, done_rx)
    }

    /// Next stream event, or `None` once the stream has ended.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Wait for the invocation to finish. Unread events are discarded.
    pub async fn wait(mut self) -> Result<()> {
        while self.events.recv().await.is_some() {}
        self.outcome.await.map_err(|_| AgentError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replay_session() {
        let mut session = AgentSession::replay(
            vec![StreamEvent::text_line("a"), StreamEvent::text_line("b")],
            Ok(()),
        );

        assert_eq!(session.next_event().await.unwrap().text(), Some("a"));
        assert_eq!(session.next_event().await.unwrap().text(), Some("b"));
        assert!(session.next_event().await.is_none());
        assert!(session.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_wait_surfaces_failure() {
        let session = AgentSession::replay(
            vec![StreamEvent::text_line("partial")],
            Err(AgentError::Exited {
                code: 1,
                stderr: "boom".into(),
            }),
        );

        let err = session.wait().await.unwrap_err();
        assert!(matches!(err, AgentError::Exited { code: 1, .. }));
    }

    #[tokio::test]
    async fn test_dropped_outcome_is_closed() {
        let (_tx, rx) = mpsc::channel::<StreamEvent>(1);
        let (done_tx, done_rx) = oneshot::channel::<Result<()>>();
        drop(_tx);
        drop(done_tx);

        let session = AgentSession::new(rx, done_rx);
        assert!(matches!(session.wait().await, Err(AgentError::Closed)));
    }
}
