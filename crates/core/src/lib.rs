//! Domain records shared by the devloop crates.
//!
//! Every record here is owned by the record store; the engine only reads
//! and writes them through `db::RecordStore`.

pub mod domain;
pub mod error;

pub use domain::feedback::{Feedback, FeedbackKind};
pub use domain::message::{CreateSessionMessage, SessionMessage};
pub use domain::project::{Project, ProjectStatus};
pub use domain::session::{AgentRole, Session, SessionStatus};
pub use domain::task::{Task, TaskStatus};
pub use error::CoreError;
