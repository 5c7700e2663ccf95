//! `devloop run`: prepare, launch and watch one project run.

use anyhow::Result;
use colored::Colorize;
use devloop_core::{Project, ProjectStatus};
use orchestrator::{NotesDigest, OrchestratorError, TaskLoopControl};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DEVLOOP_DIR;
use crate::render;
use crate::App;

pub async fn run_project(app: &App, project: &Project) -> Result<()> {
    let state = app.controller.prepare(project.id).await?;
    render::print_state(&state);
    println!();

    if !app.controller.detector().is_resumable(project.id).await? {
        println!("Nothing left to run. Use `devloop retry` or `devloop reset` to run tasks again.");
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let (mut events, control, join) = app.controller.start(project.id, cancel.clone()).into_parts();
    let input = tokio::spawn(handle_input(control, cancel.clone()));

    while let Some(envelope) = events.recv().await {
        render::print_event(&envelope.event);
    }
    let outcome = join.finish().await?;
    input.abort();

    match outcome.result {
        Ok(()) => {}
        Err(OrchestratorError::Cancelled) => {
            println!("{}", "Run cancelled. Run the same command again to resume.".yellow());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }

    let finished = app.store.get_project(project.id).await?;
    if finished.status == ProjectStatus::Completed {
        let digest = app.controller.capture_notes(project.id).await?;
        write_notes(app, &finished, &digest).await;
    }
    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl-C received, stopping after the current agent call");
        eprintln!("{}", "Stopping after the current agent call...".yellow());
        cancel.cancel();
    }
}

/// Enter continues a paused run; `p` toggles pause mode.
async fn handle_input(control: TaskLoopControl, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = cancel.cancelled() => return,
        };
        match line {
            Ok(Some(line)) => match line.trim() {
                "" => control.continue_run().await,
                "p" | "P" => {
                    control.toggle_pause_mode().await;
                }
                other => eprintln!("Unknown input '{other}': Enter continues, 'p' toggles pause"),
            },
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                return;
            }
        }
    }
}

async fn write_notes(app: &App, project: &Project, digest: &NotesDigest) {
    let dir = app.root.join(DEVLOOP_DIR).join("notes").join(project.id.to_string());
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        warn!(path = %dir.display(), error = %e, "Failed to create notes directory");
        return;
    }

    for (file, content) in [
        ("feedback.md", &digest.feedback),
        ("learnings.md", &digest.learnings),
    ] {
        if content.is_empty() {
            continue;
        }
        let path = dir.join(file);
        let body = format!("# {}: {}\n\n{}", project.name, file.trim_end_matches(".md"), content);
        match tokio::fs::write(&path, body).await {
            Ok(()) => println!("Wrote {}", path.display()),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to write notes"),
        }
    }
}
