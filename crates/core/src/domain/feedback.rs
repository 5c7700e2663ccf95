use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// Reviewer rejection text handed to the next developer round.
    Review,
    /// `## Learnings` section reported by the developer.
    Learning,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Learning => "learning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "review" => Some(Self::Review),
            "learning" => Some(Self::Learning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Feedback {
    pub id: Uuid,
    pub task_id: Uuid,
    pub iteration: u32,
    pub kind: FeedbackKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(
        task_id: Uuid,
        iteration: u32,
        kind: FeedbackKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            iteration,
            kind,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn review(task_id: Uuid, iteration: u32, content: impl Into<String>) -> Self {
        Self::new(task_id, iteration, FeedbackKind::Review, content)
    }

    pub fn learning(task_id: Uuid, iteration: u32, content: impl Into<String>) -> Self {
        Self::new(task_id, iteration, FeedbackKind::Learning, content)
    }
}
