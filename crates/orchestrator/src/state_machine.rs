use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, Result};

/// Lifecycle of one implementation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopStatus {
    #[default]
    Pending,
    Running,
    Approved,
    Escalated,
    Failed,
}

impl LoopStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Approved => "approved",
            Self::Escalated => "escalated",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Escalated | Self::Failed)
    }
}

pub struct LoopStateMachine;

impl LoopStateMachine {
    pub fn validate_transition(from: &LoopStatus, to: &LoopStatus) -> Result<()> {
        let allowed = Self::allowed_transitions(from);

        if allowed.contains(to) {
            Ok(())
        } else {
            Err(OrchestratorError::InvalidTransition {
                from: from.as_str().to_string(),
                to: to.as_str().to_string(),
            })
        }
    }

    fn allowed_transitions(from: &LoopStatus) -> &'static [LoopStatus] {
        match from {
            LoopStatus::Pending => &[LoopStatus::Running, LoopStatus::Failed],
            LoopStatus::Running => &[
                LoopStatus::Approved,
                LoopStatus::Escalated,
                LoopStatus::Failed,
            ],
            LoopStatus::Approved | LoopStatus::Escalated | LoopStatus::Failed => &[],
        }
    }

    pub fn can_transition(from: &LoopStatus, to: &LoopStatus) -> bool {
        Self::validate_transition(from, to).is_ok()
    }
}
