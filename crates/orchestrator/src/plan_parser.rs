//! Plan parser for splitting markdown implementation plans into tasks
//!
//! Recognized task headers (level 2 or 3, case-insensitive):
//! - `## Task 1: Title`
//! - `### Step 2 - Title`
//! - `## Phase 3: Title`
//!
//! Headers inside fenced code blocks are ignored. A plan without any task
//! header becomes a single task.

use std::sync::OnceLock;

use regex::Regex;

use crate::markers::CODE_FENCE;

/// One task extracted from a plan, in plan order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedTask {
    /// 1-based, renumbered sequentially regardless of the numbers in the plan.
    pub sequence: u32,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedPlan {
    /// Text before the first task header.
    pub preamble: String,
    pub tasks: Vec<PlannedTask>,
}

impl ParsedPlan {
    pub fn is_single_task(&self) -> bool {
        self.tasks.len() <= 1
    }
}

fn task_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^#{2,3}\s*(?:Task|Step|Phase)\s+(\d+)\s*[:\-–]\s*(.+?)\s*$")
            .expect("Invalid task header regex")
    })
}

fn plan_title() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#\s+(.+?)\s*$").expect("Invalid plan title regex"))
}

/// Split `plan` into ordered tasks.
pub fn parse_plan(plan: &str) -> ParsedPlan {
    let mut preamble = Vec::new();
    let mut tasks: Vec<(String, Vec<&str>)> = Vec::new();
    let mut in_fence = false;

    for line in plan.lines() {
        if line.trim_start().starts_with(CODE_FENCE) {
            in_fence = !in_fence;
        }

        let header = if in_fence {
            None
        } else {
            task_header().captures(line)
        };

        if let Some(caps) = header {
            tasks.push((caps[2].to_string(), Vec::new()));
        } else if let Some((_, body)) = tasks.last_mut() {
            body.push(line);
        } else {
            preamble.push(line);
        }
    }

    if tasks.is_empty() {
        let plan = plan.trim();
        let title = plan_title()
            .captures(plan)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| "Implementation".to_string());
        return ParsedPlan {
            preamble: String::new(),
            tasks: vec![PlannedTask {
                sequence: 1,
                title,
                description: plan.to_string(),
            }],
        };
    }

    let tasks = tasks
        .into_iter()
        .enumerate()
        .map(|(i, (title, body))| PlannedTask {
            sequence: i as u32 + 1,
            title,
            description: body.join("\n").trim().to_string(),
        })
        .collect();

    ParsedPlan {
        preamble: preamble.join("\n").trim().to_string(),
        tasks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_without_headers_is_single_task() {
        let plan = r#"
# Add caching

This is a simple plan without tasks.

## Steps
1. Do something
2. Do something else
"#;

        let parsed = parse_plan(plan);
        assert!(parsed.is_single_task());
        assert_eq!(parsed.tasks[0].title, "Add caching");
        assert!(parsed.tasks[0].description.contains("Do something else"));
    }

    #[test]
    fn test_untitled_plan_gets_default_title() {
        let parsed = parse_plan("just do it");
        assert_eq!(parsed.tasks[0].title, "Implementation");
        assert_eq!(parsed.tasks[0].description, "just do it");
    }

    #[test]
    fn test_parse_multi_task_plan() {
        let plan = r#"
# Implementation Plan

Overview of the work.

## Task 1: Setup

Create the basic structure.
- Add files

## Task 2: Implementation

Implement the core logic.

### Task 3 - Integration

Connect everything together.
"#;

        let parsed = parse_plan(plan);
        assert_eq!(parsed.tasks.len(), 3);
        assert!(parsed.preamble.contains("Overview"));

        assert_eq!(parsed.tasks[0].sequence, 1);
        assert_eq!(parsed.tasks[0].title, "Setup");
        assert_eq!(
            parsed.tasks[0].description,
            "Create the basic structure.\n- Add files"
        );
        assert_eq!(parsed.tasks[1].title, "Implementation");
        assert_eq!(parsed.tasks[2].sequence, 3);
        assert_eq!(parsed.tasks[2].title, "Integration");
    }

    #[test]
    fn test_step_and_phase_headers() {
        let plan = "## Step 1 - Initial Setup\nDo the setup.\n\n## phase 2: Core Work\nDo the work.\n";

        let parsed = parse_plan(plan);
        assert_eq!(parsed.tasks.len(), 2);
        assert_eq!(parsed.tasks[0].title, "Initial Setup");
        assert_eq!(parsed.tasks[1].title, "Core Work");
    }

    #[test]
    fn test_numbers_are_renumbered() {
        let plan = "## Task 4: First\nA\n## Task 9: Second\nB\n";

        let parsed = parse_plan(plan);
        let sequences: Vec<u32> = parsed.tasks.iter().map(|t| t.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
    }

    #[test]
    fn test_headers_in_code_fence_are_ignored() {
        let plan = "## Task 1: Real\nExample:\n```md\n## Task 2: Fake\n```\n";

        let parsed = parse_plan(plan);
        assert_eq!(parsed.tasks.len(), 1);
        assert!(parsed.tasks[0].description.contains("## Task 2: Fake"));
    }
}
