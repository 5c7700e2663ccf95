pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod implementation_loop;
pub mod markers;
pub mod parser;
pub mod plan_parser;
pub mod prompts;
pub mod resume;
pub mod state_machine;
pub mod task_loop;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use config::EngineConfig;
pub use context::EngineContext;
pub use controller::{Controller, NotesDigest, RunHandle, RunJoin};
pub use error::{OrchestratorError, Result};
pub use implementation_loop::{ImplementationLoop, LoopReport};
pub use parser::{OutputParser, ParseResult, ReviewVerdict, RoleOutput};
pub use plan_parser::{parse_plan, ParsedPlan, PlannedTask};
pub use prompts::Prompts;
pub use resume::{ProjectState, ProjectStateKind, ResumeDetector};
pub use state_machine::{LoopStateMachine, LoopStatus};
pub use task_loop::{RunOutcome, TaskLoop, TaskLoopControl};
