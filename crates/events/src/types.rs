//! Event types for the devloop engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Envelope wrapping all events with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    /// Unique event ID
    pub id: Uuid,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    /// The actual event
    pub event: E,
}

impl<E> EventEnvelope<E> {
    /// Create a new event envelope with auto-generated ID and timestamp
    pub fn new(event: E) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }
}

/// Progress of one task's developer/reviewer loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    #[serde(rename = "loop.started")]
    Started { task_id: Uuid, max_iterations: u32 },

    /// Developer agent invoked for this iteration
    #[serde(rename = "loop.developing")]
    Developing { iteration: u32 },

    /// Reviewer agent invoked for this iteration
    #[serde(rename = "loop.reviewing")]
    Reviewing { iteration: u32 },

    /// Reviewer rejected the change
    #[serde(rename = "loop.feedback")]
    Feedback { iteration: u32, feedback: String },

    #[serde(rename = "loop.approved")]
    Approved { iteration: u32 },

    /// Terminal failure; `escalated` when the review budget ran out
    #[serde(rename = "loop.failed")]
    Failed {
        iteration: u32,
        message: String,
        escalated: bool,
    },
}

impl LoopEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved { .. } | Self::Failed { .. })
    }
}

/// Per-run task tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub completed: u32,
    /// Tasks that failed or escalated, including ones already failed before the run.
    pub failed: u32,
    /// Previously escalated tasks that were not attempted.
    pub skipped: u32,
}

/// Progress of a whole project run. Inner loop events arrive wrapped in
/// [`TaskLoopEvent::Loop`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskLoopEvent {
    #[serde(rename = "run.started")]
    Started { project_id: Uuid, total_tasks: usize },

    #[serde(rename = "task.started")]
    TaskStarted {
        index: usize,
        task_id: Uuid,
        title: String,
    },

    /// Task already resolved before this run
    #[serde(rename = "task.skipped")]
    TaskSkipped {
        index: usize,
        task_id: Uuid,
        title: String,
        status: String,
    },

    #[serde(rename = "task.loop")]
    Loop {
        index: usize,
        title: String,
        event: LoopEvent,
    },

    #[serde(rename = "task.completed")]
    TaskCompleted {
        index: usize,
        task_id: Uuid,
        title: String,
    },

    #[serde(rename = "task.failed")]
    TaskFailed {
        index: usize,
        task_id: Uuid,
        title: String,
        message: String,
        escalated: bool,
    },

    /// Waiting for a continue signal after task `index`
    #[serde(rename = "run.paused")]
    Paused { index: usize },

    #[serde(rename = "run.resumed")]
    Resumed,

    #[serde(rename = "run.pause_mode_changed")]
    PauseModeChanged { enabled: bool },

    /// The run ended before visiting every task
    #[serde(rename = "run.stopped")]
    Stopped { summary: RunSummary, reason: String },

    #[serde(rename = "run.summary")]
    Summary { summary: RunSummary },
}
