use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to start agent: {0}")]
    Spawn(String),

    #[error("Agent exited with code {code}: {stderr}")]
    Exited { code: i32, stderr: String },

    #[error("Agent session ended without reporting an outcome")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AgentError>;
