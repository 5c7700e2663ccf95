use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{Result, VcsError};
use crate::provider::ChangeSetProvider;

/// Git has no working-copy change object, so a task's change is everything
/// since the `HEAD` recorded when the task started.
pub struct GitVcs {
    repo_path: PathBuf,
    baseline: RwLock<Option<String>>,
}

impl GitVcs {
    pub fn new(repo_path: PathBuf) -> Self {
        Self {
            repo_path,
            baseline: RwLock::new(None),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<String> {
        debug!("Running git {:?} in {:?}", args, self.repo_path);

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::CommandFailed(format!(
                "git {} failed: {}",
                args.join(" "),
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn is_available(&self) -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub async fn baseline(&self) -> Option<String> {
        self.baseline.read().await.clone()
    }
}

#[async_trait]
impl ChangeSetProvider for GitVcs {
    fn name(&self) -> &'static str {
        "git"
    }

    async fn new_change(&self, title: &str) -> Result<String> {
        if !self.repo_path.join(".git").exists() {
            return Err(VcsError::NotInitialized(
                self.repo_path.display().to_string(),
            ));
        }

        let head = self.run_git(&["rev-parse", "--short", "HEAD"]).await?;
        let head = head.trim().to_string();
        debug!(title, baseline = %head, "recorded git baseline");

        *self.baseline.write().await = Some(head.clone());
        Ok(head)
    }

    async fn show(&self) -> Result<String> {
        let baseline = self.baseline.read().await.clone();
        match baseline {
            Some(base) => match self.run_git(&["diff", &base]).await {
                Ok(diff) => Ok(diff),
                Err(e) => {
                    warn!(error = %e, baseline = %base, "diff against baseline failed, using HEAD");
                    self.run_git(&["diff", "HEAD"]).await
                }
            },
            None => self.run_git(&["diff", "HEAD"]).await,
        }
    }
}
