use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::provider::ChangeSetProvider;

/// For directories without version control. Reviewers get a placeholder
/// instead of a diff.
#[derive(Debug, Default)]
pub struct NoopChanges;

pub const NO_DIFF_PLACEHOLDER: &str =
    "(no version control available; inspect the working directory directly)";

#[async_trait]
impl ChangeSetProvider for NoopChanges {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn new_change(&self, _title: &str) -> Result<String> {
        Ok(format!("noop-{}", Uuid::new_v4().simple()))
    }

    async fn show(&self) -> Result<String> {
        Ok(NO_DIFF_PLACEHOLDER.to_string())
    }
}
