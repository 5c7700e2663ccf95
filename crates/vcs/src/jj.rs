use async_trait::async_trait;
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

use crate::error::{Result, VcsError};
use crate::provider::ChangeSetProvider;

/// One `jj` change per task; the working-copy change is what gets reviewed.
pub struct JujutsuVcs {
    repo_path: PathBuf,
}

impl JujutsuVcs {
    pub fn new(repo_path: PathBuf) -> Self {
        Self { repo_path }
    }

    async fn run_jj(&self, args: &[&str]) -> Result<String> {
        debug!("Running jj {:?} in {:?}", args, self.repo_path);

        let output = Command::new("jj")
            .args(args)
            .current_dir(&self.repo_path)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VcsError::CommandFailed(format!(
                "jj {} failed: {}",
                args.join(" "),
                stderr
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    pub async fn is_available(&self) -> bool {
        Command::new("jj")
            .arg("--version")
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

#[async_trait]
impl ChangeSetProvider for JujutsuVcs {
    fn name(&self) -> &'static str {
        "jujutsu"
    }

    async fn new_change(&self, title: &str) -> Result<String> {
        if !self.repo_path.join(".jj").exists() {
            return Err(VcsError::NotInitialized(
                self.repo_path.display().to_string(),
            ));
        }

        self.run_jj(&["new", "-m", title]).await?;
        let change_id = self
            .run_jj(&["log", "-r", "@", "--no-graph", "-T", "change_id"])
            .await?;

        let change_id = change_id.trim();
        if change_id.is_empty() {
            return Err(VcsError::Parse("jj returned an empty change id".into()));
        }
        Ok(change_id.to_string())
    }

    async fn show(&self) -> Result<String> {
        self.run_jj(&["show", "--git"]).await
    }
}
