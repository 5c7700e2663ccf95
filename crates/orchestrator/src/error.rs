use std::fmt::Display;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Run cancelled")]
    Cancelled,

    #[error("Review budget exhausted after {iterations} iteration(s) without approval")]
    Escalated { iterations: u32 },

    #[error("Agent failed: {0}")]
    AgentFailed(#[from] agent::AgentError),

    #[error("Change-set provider failed: {0}")]
    ChangeSet(#[from] vcs::VcsError),

    #[error("Store error: {0}")]
    Store(#[from] db::DbError),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Task {title} failed: {reason}")]
    TaskFailed { title: String, reason: String },

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Run task aborted: {0}")]
    Aborted(String),
}

impl OrchestratorError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::Escalated { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_not_found())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Swallow the error of a non-critical write, logging it.
pub(crate) fn best_effort<T, E: Display>(result: std::result::Result<T, E>, action: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(error = %e, action, "best-effort write failed");
            None
        }
    }
}
