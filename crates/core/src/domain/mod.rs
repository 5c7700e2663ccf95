pub mod feedback;
pub mod message;
pub mod project;
pub mod session;
pub mod task;
