//! Turns free-form agent output into structured results.
//!
//! Parsing is marker and header based. Section headers (`## Progress`,
//! `## Learnings`, `## Status`) are recognized outside fenced code blocks
//! only; completion markers must match exactly.

use std::sync::OnceLock;

use devloop_core::AgentRole;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::markers;

/// Sections and completion flag extracted from one agent response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub progress: String,
    pub learnings: String,
    pub status: String,
    pub is_done: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVerdict {
    pub approved: bool,
    /// Empty when approved.
    pub feedback: String,
}

/// Role-aware parse. `verdict` is only present for reviewers, and a
/// reviewer is done exactly when it approved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleOutput {
    pub progress: String,
    pub learnings: String,
    pub status: String,
    pub done: bool,
    pub verdict: Option<ReviewVerdict>,
}

impl RoleOutput {
    pub fn approved(&self) -> bool {
        self.verdict.as_ref().is_some_and(|v| v.approved)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Progress,
    Learnings,
    Status,
}

impl Section {
    fn index(self) -> usize {
        match self {
            Self::Progress => 0,
            Self::Learnings => 1,
            Self::Status => 2,
        }
    }
}

fn section_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^[ \t]*##[ \t]+({}|{}|{})[ \t]*:?[ \t]*$",
            markers::PROGRESS_SECTION,
            markers::LEARNINGS_SECTION,
            markers::STATUS_SECTION
        ))
        .expect("Invalid section header regex")
    })
}

fn issues_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"(?i)^[ \t]*(?:#{{1,6}}[ \t]*)?(?:\*\*)?({})[ \t]+issues[ \t]*:?[ \t]*(?:\*\*)?[ \t]*:?[ \t]*$",
            markers::ISSUE_SEVERITIES.join("|")
        ))
        .expect("Invalid issues header regex")
    })
}

fn legacy_approval_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(r"(?i)\b{}\b", markers::LEGACY_APPROVED))
            .expect("Invalid approval regex")
    })
}

fn section_header(line: &str) -> Option<Section> {
    let caps = section_header_regex().captures(line)?;
    let name = caps.get(1)?.as_str();
    if name.eq_ignore_ascii_case(markers::PROGRESS_SECTION) {
        Some(Section::Progress)
    } else if name.eq_ignore_ascii_case(markers::LEARNINGS_SECTION) {
        Some(Section::Learnings)
    } else {
        Some(Section::Status)
    }
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(markers::CODE_FENCE)
}

/// Join lines, dropping blank lines at both ends.
fn trim_blank_lines(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

pub struct OutputParser;

impl OutputParser {
    /// Parse a raw response into sections. Done means the generic
    /// [`markers::DONE`] marker is present.
    pub fn parse(raw: &str) -> ParseResult {
        if raw.trim().is_empty() {
            return ParseResult::default();
        }

        let is_done = Self::has_marker(raw, markers::DONE);

        // A progress header anywhere, even fenced, disables the fallback.
        let mentions_progress = raw
            .lines()
            .any(|line| section_header(line) == Some(Section::Progress));
        if !mentions_progress {
            return ParseResult {
                progress: raw.trim().to_string(),
                is_done,
                ..Default::default()
            };
        }

        let [progress, learnings, status] = Self::extract_sections(raw);
        ParseResult {
            progress: progress.unwrap_or_default(),
            learnings: learnings.unwrap_or_default(),
            status: status.unwrap_or_default(),
            is_done,
        }
    }

    pub fn parse_for_role(raw: &str, role: AgentRole) -> RoleOutput {
        let parsed = Self::parse(raw);

        match role {
            AgentRole::Developer => RoleOutput {
                done: Self::has_marker(raw, markers::DEV_DONE)
                    || Self::has_marker(raw, markers::DONE),
                progress: parsed.progress,
                learnings: parsed.learnings,
                status: parsed.status,
                verdict: None,
            },
            AgentRole::Reviewer => {
                let verdict = Self::verdict_from(raw, &parsed);
                RoleOutput {
                    done: verdict.approved,
                    progress: parsed.progress,
                    learnings: parsed.learnings,
                    status: parsed.status,
                    verdict: Some(verdict),
                }
            }
        }
    }

    pub fn review_verdict(raw: &str) -> ReviewVerdict {
        let parsed = Self::parse(raw);
        Self::verdict_from(raw, &parsed)
    }

    /// Literal marker match. A fourth `!` right after the marker does not
    /// count; anything before it does not matter.
    pub fn has_marker(text: &str, marker: &str) -> bool {
        text.match_indices(marker)
            .any(|(idx, _)| !text[idx + marker.len()..].starts_with('!'))
    }

    pub fn is_approved(raw: &str) -> bool {
        if Self::has_marker(raw, markers::REVIEWER_APPROVED) {
            return true;
        }

        legacy_approval_regex().find_iter(raw).any(|m| {
            let before = raw[..m.start()].to_uppercase();
            !markers::APPROVAL_NEGATIONS
                .iter()
                .any(|negation| before.ends_with(negation))
        })
    }

    fn verdict_from(raw: &str, parsed: &ParseResult) -> ReviewVerdict {
        if raw.trim().is_empty() {
            return ReviewVerdict::default();
        }

        if Self::is_approved(raw) {
            return ReviewVerdict {
                approved: true,
                feedback: String::new(),
            };
        }

        let feedback = Self::prefixed_feedback(raw)
            .or_else(|| Self::issue_feedback(raw))
            .unwrap_or_else(|| {
                if parsed.progress.is_empty() {
                    raw.trim().to_string()
                } else {
                    parsed.progress.clone()
                }
            });

        ReviewVerdict {
            approved: false,
            feedback,
        }
    }

    fn prefixed_feedback(raw: &str) -> Option<String> {
        // ASCII uppercasing keeps byte offsets valid for `raw`.
        let upper = raw.to_ascii_uppercase();
        markers::FEEDBACK_PREFIXES.iter().find_map(|prefix| {
            let idx = upper.find(prefix)?;
            let rest = raw[idx + prefix.len()..].trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
    }

    /// Concatenate the non-empty Critical/Major/Minor issue lists.
    fn issue_feedback(raw: &str) -> Option<String> {
        let mut found: Vec<Option<String>> = vec![None; markers::ISSUE_SEVERITIES.len()];
        let mut current: Option<usize> = None;
        let mut buf: Vec<&str> = Vec::new();

        fn flush(current: Option<usize>, buf: &mut Vec<&str>, found: &mut [Option<String>]) {
            if let Some(idx) = current {
                if found[idx].is_none() {
                    found[idx] = Some(trim_blank_lines(buf));
                }
            }
            buf.clear();
        }

        for line in raw.lines() {
            if let Some(caps) = issues_header_regex().captures(line) {
                flush(current, &mut buf, &mut found);
                let severity = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                current = markers::ISSUE_SEVERITIES
                    .iter()
                    .position(|s| s.eq_ignore_ascii_case(severity));
                continue;
            }
            if current.is_some() && line.trim_start().starts_with('#') {
                flush(current, &mut buf, &mut found);
                current = None;
                continue;
            }
            if current.is_some() {
                buf.push(line);
            }
        }
        flush(current, &mut buf, &mut found);

        let parts: Vec<String> = markers::ISSUE_SEVERITIES
            .iter()
            .zip(found)
            .filter_map(|(severity, content)| {
                let content = content?;
                if content.is_empty() || is_none_marker(&content) {
                    return None;
                }
                Some(format!("{severity} Issues:\n{content}"))
            })
            .collect();

        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// First-occurrence content of each section. Later duplicates end the
    /// section before them and are otherwise ignored.
    fn extract_sections(raw: &str) -> [Option<String>; 3] {
        let mut found: [Option<String>; 3] = [None, None, None];
        // (section, whether its content is kept)
        let mut current: Option<(Section, bool)> = None;
        let mut buf: Vec<&str> = Vec::new();
        let mut in_fence = false;

        for line in raw.lines() {
            if is_fence(line) {
                in_fence = !in_fence;
            } else if !in_fence {
                if let Some(section) = section_header(line) {
                    if let Some((open, true)) = current {
                        found[open.index()] = Some(trim_blank_lines(&buf));
                    }
                    buf.clear();
                    current = Some((section, found[section.index()].is_none()));
                    continue;
                }
            }

            if let Some((_, true)) = current {
                buf.push(line);
            }
        }

        if let Some((open, true)) = current {
            found[open.index()] = Some(trim_blank_lines(&buf));
        }
        found
    }
}

fn is_none_marker(content: &str) -> bool {
    let text = content.trim().trim_start_matches(['-', '*']).trim();
    text.trim_end_matches('.').eq_ignore_ascii_case("none")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_marker_requires_exact_form() {
        assert!(OutputParser::parse("all good\nDONE DONE DONE!!!").is_done);
        assert!(OutputParser::parse("DONE DONE DONE!!! trailing").is_done);
        assert!(!OutputParser::parse("DONE DONE DONE!!").is_done);
        assert!(!OutputParser::parse("DONE DONE DONE!!!!").is_done);
        assert!(OutputParser::parse("DONE DONE DONE DONE!!!").is_done);
        assert!(OutputParser::parse("XDONE DONE DONE!!!").is_done);
    }

    #[test]
    fn test_sections_are_order_independent() {
        let a = OutputParser::parse("## Progress\nA\n\n## Learnings\nB");
        assert_eq!(a.progress, "A");
        assert_eq!(a.learnings, "B");

        let b = OutputParser::parse("## Learnings\nB\n\n## Progress\nA");
        assert_eq!(b.progress, "A");
        assert_eq!(b.learnings, "B");
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let result = OutputParser::parse("## PROGRESS\nwrote code\n## status\nok");
        assert_eq!(result.progress, "wrote code");
        assert_eq!(result.status, "ok");
    }

    #[test]
    fn test_fenced_header_is_not_a_section() {
        let raw = "Here is an example:\n```\n## Progress\nfake\n```\n## Learnings\nreal";
        let result = OutputParser::parse(raw);
        assert_eq!(result.progress, "");
        assert_eq!(result.learnings, "real");
    }

    #[test]
    fn test_fenced_content_stays_in_section() {
        let raw = "## Progress\nAdded:\n```rust\n## Status\nfn x() {}\n```\n## Status\ndone";
        let result = OutputParser::parse(raw);
        assert_eq!(result.progress, "Added:\n```rust\n## Status\nfn x() {}\n```");
        assert_eq!(result.status, "done");
    }

    #[test]
    fn test_duplicate_header_keeps_first() {
        let raw = "## Progress\nfirst\n## Progress\nsecond\n## Status\nok";
        let result = OutputParser::parse(raw);
        assert_eq!(result.progress, "first");
        assert_eq!(result.status, "ok");
    }

    #[test]
    fn test_malformed_output_falls_back_to_progress() {
        let result = OutputParser::parse("\n  I changed some files.\n## Learnings\nx\n");
        assert_eq!(result.progress, "I changed some files.\n## Learnings\nx");
        assert_eq!(result.learnings, "");
        assert_eq!(result.status, "");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(OutputParser::parse(""), ParseResult::default());
        assert_eq!(OutputParser::parse("  \n\t"), ParseResult::default());

        let output = OutputParser::parse_for_role("   ", AgentRole::Reviewer);
        assert!(!output.done);
        assert_eq!(output.verdict, Some(ReviewVerdict::default()));
    }

    #[test]
    fn test_markers_are_role_scoped() {
        let dev_text = "## Progress\nimplemented\nDEV_DONE DEV_DONE DEV_DONE!!!";

        let as_dev = OutputParser::parse_for_role(dev_text, AgentRole::Developer);
        assert!(as_dev.done);
        assert!(as_dev.verdict.is_none());

        let as_reviewer = OutputParser::parse_for_role(dev_text, AgentRole::Reviewer);
        assert!(!as_reviewer.done);
        assert!(!as_reviewer.approved());

        let review_text = "REVIEWER_APPROVED REVIEWER_APPROVED!!!";
        assert!(!OutputParser::parse_for_role(review_text, AgentRole::Developer).done);
        assert!(OutputParser::parse_for_role(review_text, AgentRole::Reviewer).approved());
    }

    #[test]
    fn test_approval_markers() {
        assert!(OutputParser::is_approved("Looks good.\nREVIEWER_APPROVED REVIEWER_APPROVED!!!"));
        assert!(!OutputParser::is_approved("REVIEWER_APPROVED REVIEWER_APPROVED!!"));
        assert!(OutputParser::is_approved("Verdict: APPROVED"));
        assert!(!OutputParser::is_approved("NOT APPROVED"));
        assert!(!OutputParser::is_approved("This is NOT YET APPROVED."));
        assert!(!OutputParser::is_approved("It CANNOT BE APPROVED as is"));
        assert!(OutputParser::is_approved("approved"));
        assert!(OutputParser::is_approved("Verdict: Approved"));
        assert!(!OutputParser::is_approved("Not approved, see below"));
        assert!(!OutputParser::is_approved("UNAPPROVED"));
    }

    #[test]
    fn test_feedback_prefix_is_case_insensitive() {
        let verdict = OutputParser::review_verdict("Some notes.\nFeedback: rename the module");
        assert!(!verdict.approved);
        assert_eq!(verdict.feedback, "rename the module");

        let verdict = OutputParser::review_verdict("reviewer_feedback: add a test for ß");
        assert_eq!(verdict.feedback, "add a test for ß");
    }

    #[test]
    fn test_feedback_prefix_wins() {
        let raw = "## Critical Issues\n- crash\n\nREVIEWER_FEEDBACK:  Handle the empty list.  ";
        let verdict = OutputParser::review_verdict(raw);
        assert!(!verdict.approved);
        assert_eq!(verdict.feedback, "Handle the empty list.");

        let verdict = OutputParser::review_verdict("FEEDBACK: add tests");
        assert_eq!(verdict.feedback, "add tests");
    }

    #[test]
    fn test_feedback_from_issue_sections() {
        let raw = "## Review\n\n### Critical Issues\nNone\n\n### Major Issues\n- no error handling\n\n### Minor Issues\n- typo in README\n\n## Summary\nneeds work";
        let verdict = OutputParser::review_verdict(raw);
        assert!(!verdict.approved);
        assert_eq!(
            verdict.feedback,
            "Major Issues:\n- no error handling\n\nMinor Issues:\n- typo in README"
        );
    }

    #[test]
    fn test_feedback_falls_back_to_text() {
        let verdict = OutputParser::review_verdict("Please split the module.");
        assert!(!verdict.approved);
        assert_eq!(verdict.feedback, "Please split the module.");

        let verdict = OutputParser::review_verdict("## Progress\nReviewed.\n## Status\nchanges needed");
        assert_eq!(verdict.feedback, "Reviewed.");
    }

    #[test]
    fn test_all_issue_sections_none_falls_back() {
        let raw = "The change is incomplete.\n### Critical Issues\nNone\n### Major Issues\nnone.";
        let verdict = OutputParser::review_verdict(raw);
        assert_eq!(verdict.feedback, raw.trim());
    }
}
