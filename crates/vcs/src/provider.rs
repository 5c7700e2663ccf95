use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Snapshots per-task work and describes it for review.
#[async_trait]
pub trait ChangeSetProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start a new change for a task and return its identifier.
    async fn new_change(&self, title: &str) -> Result<String>;

    /// Diff of the current change, in git format where the backend allows.
    async fn show(&self) -> Result<String>;
}

/// Which backend to use for a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VcsBackend {
    #[default]
    Auto,
    Jj,
    Git,
    None,
}

impl VcsBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Jj => "jj",
            Self::Git => "git",
            Self::None => "none",
        }
    }
}

impl std::str::FromStr for VcsBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "jj" | "jujutsu" => Ok(Self::Jj),
            "git" => Ok(Self::Git),
            "none" | "noop" => Ok(Self::None),
            other => Err(format!("unknown vcs backend: {other}")),
        }
    }
}
