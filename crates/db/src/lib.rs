//! Record store for projects, tasks, sessions, archived agent messages and
//! feedback.
//!
//! [`RecordStore`] is the interface the engine consumes. [`SqliteStore`]
//! persists through the sqlx repositories in [`repositories`];
//! [`MemoryStore`] keeps everything in process.

mod error;
mod memory;
pub mod models;
mod pool;
pub mod repositories;
mod store;

pub use error::*;
pub use memory::MemoryStore;
pub use pool::*;
pub use repositories::*;
pub use store::{RecordStore, SqliteStore};
