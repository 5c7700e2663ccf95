use std::path::{Path, PathBuf};

use agent::DEFAULT_AGENT_COMMAND;
use orchestrator::EngineConfig;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};
use vcs::VcsBackend;

pub const DEVLOOP_DIR: &str = ".devloop";
pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "devloop.db";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Defaults to `.devloop/devloop.db` under the repository root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VcsConfig {
    pub backend: VcsBackend,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub developer_command: String,
    pub reviewer_command: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            developer_command: DEFAULT_AGENT_COMMAND.to_string(),
            reviewer_command: DEFAULT_AGENT_COMMAND.to_string(),
        }
    }
}

/// Contents of `.devloop/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DevloopConfig {
    pub database: DatabaseConfig,
    pub vcs: VcsConfig,
    pub agent: AgentConfig,
    pub engine: EngineConfig,
}

impl DevloopConfig {
    pub fn path(root: &Path) -> PathBuf {
        root.join(DEVLOOP_DIR).join(CONFIG_FILE)
    }

    /// Read the config under `root`, falling back to defaults when the file
    /// is missing or invalid.
    pub async fn read(root: &Path) -> Self {
        let config_path = Self::path(root);

        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(&config_path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    pub async fn write(&self, root: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(root.join(DEVLOOP_DIR)).await?;
        let content = toml::to_string_pretty(self)?;
        fs::write(Self::path(root), content).await?;
        Ok(())
    }

    pub fn database_url(&self, root: &Path) -> String {
        match &self.database.url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}",
                root.join(DEVLOOP_DIR).join(DEFAULT_DB_NAME).display()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = DevloopConfig::read(dir.path()).await;

        assert_eq!(config.engine.max_iterations, 3);
        assert_eq!(config.vcs.backend, VcsBackend::Auto);
        assert_eq!(config.agent.developer_command, DEFAULT_AGENT_COMMAND);
        assert!(config
            .database_url(dir.path())
            .ends_with(".devloop/devloop.db"));
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = DevloopConfig::default();
        config.vcs.backend = VcsBackend::Git;
        config.engine.max_retries = 2;
        config.write(dir.path()).await.unwrap();

        let loaded = DevloopConfig::read(dir.path()).await;
        assert_eq!(loaded.vcs.backend, VcsBackend::Git);
        assert_eq!(loaded.engine.max_retries, 2);
    }

    #[tokio::test]
    async fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(DEVLOOP_DIR)).unwrap();
        std::fs::write(
            DevloopConfig::path(dir.path()),
            "[engine]\npause_after_task = true\n\n[agent]\nreviewer_command = \"cat\"\n",
        )
        .unwrap();

        let config = DevloopConfig::read(dir.path()).await;
        assert!(config.engine.pause_after_task);
        assert_eq!(config.engine.max_iterations, 3);
        assert_eq!(config.agent.reviewer_command, "cat");
        assert_eq!(config.agent.developer_command, DEFAULT_AGENT_COMMAND);
    }

    #[tokio::test]
    async fn test_invalid_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(DEVLOOP_DIR)).unwrap();
        std::fs::write(DevloopConfig::path(dir.path()), "engine = [").unwrap();

        let config = DevloopConfig::read(dir.path()).await;
        assert_eq!(config.engine.max_iterations, 3);
    }
}
