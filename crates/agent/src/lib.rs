pub mod cli;
pub mod error;
pub mod events;
pub mod session;

pub use cli::{CliAgent, DEFAULT_AGENT_COMMAND};
pub use error::{AgentError, Result};
pub use events::StreamEvent;
pub use session::{AgentRequest, AgentRunner, AgentSession};
