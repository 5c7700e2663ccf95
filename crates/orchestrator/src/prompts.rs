use devloop_core::Task;

use crate::markers;

/// Cap on the change summary embedded in a reviewer prompt.
const MAX_CHANGE_SUMMARY_CHARS: usize = 60_000;

pub struct Prompts;

impl Prompts {
    pub fn developer(plan_text: &str, task: &Task, previous_feedback: Option<&str>) -> String {
        let feedback = match previous_feedback {
            Some(feedback) if !feedback.trim().is_empty() => format!(
                r#"
## Reviewer Feedback
The previous attempt was rejected. Address every point below before anything else:

{feedback}
"#
            ),
            _ => String::new(),
        };

        format!(
            r#"You are the developer for one task of a larger plan.

## Plan
{plan_text}

## Current Task
**Task {sequence}:** {title}

{description}
{feedback}
## Instructions
1. Implement only the current task
2. Keep the build and the tests passing
3. Do not start later tasks

## Required Output
Finish your answer with these sections:

## {progress}
What you changed and why.

## {learnings}
Anything a later task should know.

## {status}
When the task is complete, end with exactly: {dev_done}"#,
            sequence = task.sequence,
            title = task.title,
            description = task.description,
            progress = markers::PROGRESS_SECTION,
            learnings = markers::LEARNINGS_SECTION,
            status = markers::STATUS_SECTION,
            dev_done = markers::DEV_DONE,
        )
    }

    pub fn reviewer(plan_text: &str, task: &Task, change_summary: &str) -> String {
        format!(
            r#"You are reviewing the implementation of one task of a larger plan.

## Plan
{plan_text}

## Task Under Review
**Task {sequence}:** {title}

{description}

## Changes
```diff
{changes}
```

## Instructions
Check that the changes fully implement the task, are correct, and are tested.

If the task is complete, answer with exactly: {approved}

Otherwise start your answer with `{feedback_prefix}` and list the problems under
`### Critical Issues`, `### Major Issues` and `### Minor Issues` (write `None`
for an empty list)."#,
            sequence = task.sequence,
            title = task.title,
            description = task.description,
            changes = truncate(change_summary, MAX_CHANGE_SUMMARY_CHARS),
            approved = markers::REVIEWER_APPROVED,
            feedback_prefix = markers::FEEDBACK_PREFIXES[0],
        )
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{head}\n... (truncated)")
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn task() -> Task {
        Task::new(Uuid::new_v4(), 2, "Add parser", "Parse the config file.")
    }

    #[test]
    fn test_developer_prompt() {
        let prompt = Prompts::developer("# Plan", &task(), None);
        assert!(prompt.contains("**Task 2:** Add parser"));
        assert!(prompt.contains("Parse the config file."));
        assert!(prompt.contains(markers::DEV_DONE));
        assert!(!prompt.contains("Reviewer Feedback"));

        let prompt = Prompts::developer("# Plan", &task(), Some("add tests"));
        assert!(prompt.contains("## Reviewer Feedback"));
        assert!(prompt.contains("add tests"));
    }

    #[test]
    fn test_reviewer_prompt() {
        let prompt = Prompts::reviewer("# Plan", &task(), "+fn parse() {}");
        assert!(prompt.contains("+fn parse() {}"));
        assert!(prompt.contains(markers::REVIEWER_APPROVED));
        assert!(prompt.contains("REVIEWER_FEEDBACK:"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("abcdef", 3), "abc\n... (truncated)");
    }
}
