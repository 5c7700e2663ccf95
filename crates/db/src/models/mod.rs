//! Row types mirroring the SQLite schema, with conversions to and from the
//! domain records.

mod feedback;
mod message;
mod project;
mod session;
mod task;

pub use feedback::FeedbackRow;
pub use message::SessionMessageRow;
pub use project::ProjectRow;
pub use session::SessionRow;
pub use task::TaskRow;

use chrono::{DateTime, TimeZone, Utc};
use devloop_core::CoreError;
use uuid::Uuid;

pub(crate) fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts).single().unwrap_or_default()
}

pub(crate) fn datetime_to_timestamp(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

pub(crate) fn parse_uuid(kind: &'static str, value: &str) -> Result<Uuid, CoreError> {
    Uuid::parse_str(value).map_err(|_| CoreError::unknown(kind, value))
}

pub(crate) fn to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or_default()
}
