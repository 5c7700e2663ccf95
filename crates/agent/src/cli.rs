use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use devloop_core::AgentRole;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::events::StreamEvent;
use crate::session::{AgentRequest, AgentRunner, AgentSession};

pub const DEFAULT_AGENT_COMMAND: &str = "claude -p --output-format stream-json --verbose";

/// Lines of stderr kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Runs agents as shell commands. The prompt is written to stdin and stdout
/// is decoded line by line into [`StreamEvent`]s.
#[derive(Debug, Clone)]
pub struct CliAgent {
    developer_command: String,
    reviewer_command: String,
    event_capacity: usize,
}

impl Default for CliAgent {
    fn default() -> Self {
        Self {
            developer_command: DEFAULT_AGENT_COMMAND.to_string(),
            reviewer_command: DEFAULT_AGENT_COMMAND.to_string(),
            event_capacity: 100,
        }
    }
}

impl CliAgent {
    pub fn new(developer_command: impl Into<String>, reviewer_command: impl Into<String>) -> Self {
        Self {
            developer_command: developer_command.into(),
            reviewer_command: reviewer_command.into(),
            ..Self::default()
        }
    }

    pub fn command_for(&self, role: AgentRole) -> &str {
        match role {
            AgentRole::Developer => &self.developer_command,
            AgentRole::Reviewer => &self.reviewer_command,
        }
    }
}

#[async_trait]
impl AgentRunner for CliAgent {
    async fn start(&self, request: AgentRequest) -> Result<AgentSession> {
        let cmd = self.command_for(request.role).to_string();
        debug!(role = %request.role, cmd = %cmd, cwd = ?request.working_dir, "spawning agent");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&cmd)
            .current_dir(&request.working_dir)
            // Allow a nested CLI agent to run inside a parent agent session.
            .env_remove("CLAUDECODE")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::Spawn(format!("{cmd}: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AgentError::Spawn("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::Spawn("failed to capture stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::Spawn("failed to capture stderr".into()))?;

        let prompt = request.prompt;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
                warn!(error = %e, "failed to write prompt to agent stdin");
            }
            // Dropping stdin closes it so the agent sees EOF.
        });

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>().join("\n")
        });

        let (tx, rx) = mpsc::channel(self.event_capacity);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            let mut detached = false;
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        // Invalid UTF-8 is replaced so the pipe keeps draining.
                        let line = String::from_utf8_lossy(&buf);
                        let line = line.trim_end_matches(['\n', '\r']);
                        for event in StreamEvent::parse_line(line) {
                            if !detached && tx.send(event).await.is_err() {
                                debug!("agent session dropped, discarding output");
                                detached = true;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "error reading agent stdout");
                        break;
                    }
                }
            }
            // Closing stdout lets a still-writing child exit on EPIPE
            // instead of blocking.
            drop(reader);
            drop(tx);

            let outcome = match child.wait().await {
                Ok(status) if status.success() => Ok(()),
                Ok(status) => {
                    let stderr = stderr_task.await.unwrap_or_default();
                    Err(AgentError::Exited {
                        code: status.code().unwrap_or(-1),
                        stderr,
                    })
                }
                Err(e) => Err(AgentError::Io(e)),
            };
            debug!(success = outcome.is_ok(), "agent exited");
            let _ = done_tx.send(outcome);
        });

        Ok(AgentSession::new(rx, done_rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(role: AgentRole) -> AgentRequest {
        AgentRequest::new(role, "## Progress\nok\nDONE DONE DONE!!!\n", std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_prompt_is_fed_on_stdin() {
        let agent = CliAgent::new("cat", "cat");
        let mut session = agent.start(request(AgentRole::Developer)).await.unwrap();

        let mut texts = Vec::new();
        while let Some(event) = session.next_event().await {
            texts.extend(event.text().map(str::to_string));
        }
        assert_eq!(texts, vec!["## Progress", "ok", "DONE DONE DONE!!!"]);
        assert!(session.wait().await.is_ok());
    }

    #[tokio::test]
    async fn test_non_zero_exit_reports_stderr() {
        let agent = CliAgent::new("cat", "cat >/dev/null; echo boom >&2; exit 3");
        let session = agent.start(request(AgentRole::Reviewer)).await.unwrap();

        match session.wait().await {
            Err(AgentError::Exited { code, stderr }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stall_output() {
        let agent = CliAgent::new(
            "cat >/dev/null; printf '\\377\\n'; head -c 300000 /dev/zero | tr '\\0' a; printf '\\nend\\n'",
            "cat",
        );
        let mut session = agent.start(request(AgentRole::Developer)).await.unwrap();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), async {
            let mut texts = Vec::new();
            while let Some(event) = session.next_event().await {
                texts.extend(event.text().map(str::to_string));
            }
            (texts, session.wait().await)
        })
        .await
        .expect("agent output stalled");

        let (texts, result) = outcome;
        assert!(result.is_ok());
        assert_eq!(texts.first().map(String::as_str), Some("\u{FFFD}"));
        assert_eq!(texts.get(1).map(String::len), Some(300000));
        assert_eq!(texts.last().map(String::as_str), Some("end"));
    }

    #[test]
    fn test_command_for_role() {
        let agent = CliAgent::default();
        assert_eq!(agent.command_for(AgentRole::Developer), DEFAULT_AGENT_COMMAND);
        let agent = CliAgent::new("dev", "rev");
        assert_eq!(agent.command_for(AgentRole::Reviewer), "rev");
    }
}
