use colored::Colorize;
use devloop_core::{ProjectStatus, TaskStatus};
use events::{LoopEvent, RunSummary, TaskLoopEvent};
use orchestrator::{ProjectState, ProjectStateKind};

const FEEDBACK_PREVIEW_CHARS: usize = 200;

pub fn task_icon(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Pending => "○".normal(),
        TaskStatus::InProgress => "◑".yellow(),
        TaskStatus::Completed => "●".green(),
        TaskStatus::Failed => "✗".red(),
        TaskStatus::Escalated => "▲".red(),
    }
}

pub fn project_status(status: ProjectStatus) -> colored::ColoredString {
    match status {
        ProjectStatus::Pending => status.as_str().normal(),
        ProjectStatus::InProgress => status.as_str().yellow(),
        ProjectStatus::Completed => status.as_str().green(),
        ProjectStatus::Failed => status.as_str().red(),
    }
}

pub fn state_kind(kind: ProjectStateKind) -> colored::ColoredString {
    match kind {
        ProjectStateKind::Pending => kind.as_str().normal(),
        ProjectStateKind::Interrupted => kind.as_str().yellow(),
        ProjectStateKind::Complete => kind.as_str().green(),
        ProjectStateKind::Failed => kind.as_str().red(),
    }
}

pub fn print_state(state: &ProjectState) {
    println!(
        "Project: {} ({})",
        state.project.name.bold(),
        state.project.id
    );
    println!(
        "State:   {} (status {})",
        state_kind(state.kind),
        project_status(state.project.status)
    );
    println!(
        "Tasks:   {} total, {} pending, {} in progress, {} completed, {} failed",
        state.total, state.pending, state.in_progress, state.completed, state.failed
    );
    if let Some(task) = &state.in_progress_task {
        println!("Current: #{} {}", task.sequence, task.title);
    }
    if state.needs_cleanup {
        println!("{}", "Interrupted run detected; it will be cleaned up on the next run.".yellow());
    }
}

fn summary_line(summary: &RunSummary) -> String {
    format!(
        "{} completed, {} failed, {} skipped",
        summary.completed, summary.failed, summary.skipped
    )
}

fn preview(text: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(FEEDBACK_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text.to_string(),
    }
}

/// Render one event to the terminal.
pub fn print_event(event: &TaskLoopEvent) {
    match event {
        TaskLoopEvent::Started { total_tasks, .. } => {
            println!("{} {} task(s)", "Running".bold(), total_tasks);
        }
        TaskLoopEvent::TaskStarted { index, title, .. } => {
            println!();
            println!("{} {}", format!("[{}]", index + 1).cyan(), title.bold());
        }
        TaskLoopEvent::TaskSkipped {
            index,
            title,
            status,
            ..
        } => {
            println!(
                "{} {} {}",
                format!("[{}]", index + 1).dimmed(),
                title.dimmed(),
                format!("({status}, skipped)").dimmed()
            );
        }
        TaskLoopEvent::Loop { event, .. } => print_loop_event(event),
        TaskLoopEvent::TaskCompleted { .. } => {
            println!("    {}", "✓ completed".green());
        }
        TaskLoopEvent::TaskFailed {
            message, escalated, ..
        } => {
            let label = if *escalated { "▲ escalated" } else { "✗ failed" };
            println!("    {} {}", label.red(), message);
        }
        TaskLoopEvent::Paused { .. } => {
            println!();
            println!(
                "{}",
                "Paused. Press Enter to continue, 'p' + Enter to toggle pause mode.".yellow()
            );
        }
        TaskLoopEvent::Resumed => println!("{}", "Resumed".yellow()),
        TaskLoopEvent::PauseModeChanged { enabled } => {
            let state = if *enabled { "on" } else { "off" };
            println!("{}", format!("Pause mode {state}").yellow());
        }
        TaskLoopEvent::Stopped { summary, reason } => {
            println!();
            println!("{} {} ({})", "Stopped:".red().bold(), reason, summary_line(summary));
        }
        TaskLoopEvent::Summary { summary } => {
            println!();
            let line = summary_line(summary);
            if summary.failed > 0 {
                println!("{} {}", "Finished with failures:".red().bold(), line);
            } else {
                println!("{} {}", "Finished:".green().bold(), line);
            }
        }
    }
}

fn print_loop_event(event: &LoopEvent) {
    match event {
        LoopEvent::Started { max_iterations, .. } => {
            println!("    up to {max_iterations} review round(s)");
        }
        LoopEvent::Developing { iteration } => {
            println!("    {} developer (round {iteration})", "→".cyan());
        }
        LoopEvent::Reviewing { iteration } => {
            println!("    {} reviewer (round {iteration})", "→".cyan());
        }
        LoopEvent::Feedback { feedback, .. } => {
            println!("    {} {}", "↺ changes requested:".yellow(), preview(feedback));
        }
        LoopEvent::Approved { iteration } => {
            println!("    {} in round {iteration}", "✓ approved".green());
        }
        LoopEvent::Failed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(FEEDBACK_PREVIEW_CHARS + 10);
        let short = preview(&long);
        assert_eq!(short.chars().count(), FEEDBACK_PREVIEW_CHARS + 1);
        assert!(short.ends_with('…'));

        assert_eq!(preview("  fix it \n"), "fix it");
    }

    #[test]
    fn test_summary_line() {
        let summary = RunSummary {
            completed: 2,
            failed: 1,
            skipped: 0,
        };
        assert_eq!(summary_line(&summary), "2 completed, 1 failed, 0 skipped");
    }
}
