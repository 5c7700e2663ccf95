mod feedback_repository;
mod message_repository;
mod project_repository;
mod session_repository;
mod task_repository;

pub use feedback_repository::*;
pub use message_repository::*;
pub use project_repository::*;
pub use session_repository::*;
pub use task_repository::*;
