//! Literal markers exchanged with the agents. Completion markers match
//! exactly, approval words and feedback prefixes ignore case. Keep the
//! prompt text and the parser in sync through these constants.

/// Generic completion marker, accepted from any developer.
pub const DONE: &str = "DONE DONE DONE!!!";

/// Developer-specific completion marker.
pub const DEV_DONE: &str = "DEV_DONE DEV_DONE DEV_DONE!!!";

/// Reviewer approval marker.
pub const REVIEWER_APPROVED: &str = "REVIEWER_APPROVED REVIEWER_APPROVED!!!";

/// Older reviewers answer with a bare word.
pub const LEGACY_APPROVED: &str = "APPROVED";

/// Phrases that turn a legacy approval into a rejection when they directly
/// precede it. Longest first.
pub const APPROVAL_NEGATIONS: &[&str] = &["CANNOT BE ", "NOT YET ", "NOT "];

/// Checked in order; the first present prefix wins.
pub const FEEDBACK_PREFIXES: &[&str] = &["REVIEWER_FEEDBACK:", "FEEDBACK:"];

pub const PROGRESS_SECTION: &str = "Progress";
pub const LEARNINGS_SECTION: &str = "Learnings";
pub const STATUS_SECTION: &str = "Status";

/// Issue severities a reviewer may list, in report order.
pub const ISSUE_SEVERITIES: &[&str] = &["Critical", "Major", "Minor"];

pub const CODE_FENCE: &str = "```";
