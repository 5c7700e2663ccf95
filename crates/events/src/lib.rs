//! Engine events for devloop
//!
//! Event types published by the implementation and task loops, and the
//! bounded channel they travel on. Sends never block: when the consumer
//! falls behind, new events are dropped and counted.

mod channel;
mod types;

pub use channel::{channel, EventReceiver, EventSender};
pub use types::*;
