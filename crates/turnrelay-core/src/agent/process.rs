//! External agent process
//!
//! The prompt goes to stdin; the agent writes one `{type, data}` JSON event
//! per stdout line.

use std::collections::VecDeque;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{AgentRequest, AgentRunner};
use crate::config::AgentConfig;
use crate::constants::agent::{
    EVENT_CHANNEL_CAPACITY, IMAGE_FLAG, RESUME_FLAG, STDERR_TAIL_LINES,
};
use crate::events::{AgentEvent, RelayError};

/// Runs the configured agent command once per turn
#[derive(Debug, Clone)]
pub struct ProcessAgent {
    command: String,
    args: Vec<String>,
}

impl ProcessAgent {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone())
    }

    fn build_command(&self, request: &AgentRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args);

        if let Some(session_id) = &request.resume_session_id {
            cmd.arg(RESUME_FLAG).arg(session_id);
        }
        for image in &request.image_paths {
            cmd.arg(IMAGE_FLAG).arg(image);
        }
        if let Some(dir) = &request.project_path {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AgentRunner for ProcessAgent {
    async fn spawn(
        &self,
        request: AgentRequest,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<AgentEvent>, RelayError> {
        info!(
            command = %self.command,
            resume = request.resume_session_id.is_some(),
            "Spawning agent"
        );

        let mut child = self
            .build_command(&request)
            .spawn()
            .map_err(|e| RelayError::process(format!("Failed to spawn agent {}: {}", self.command, e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::process("Agent stdout unavailable"))?;
        let stdin = child.stdin.take();
        let stderr_tail = child.stderr.take().map(collect_stderr_tail);

        if let Some(stdin) = stdin {
            tokio::spawn(write_prompt(stdin, request.prompt));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(child, stdout, stderr_tail, tx, cancel));
        Ok(rx)
    }
}

async fn write_prompt(mut stdin: ChildStdin, prompt: String) {
    if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
        warn!("Failed to write prompt to agent stdin: {}", e);
        return;
    }
    // Agent reads the prompt until EOF
    if let Err(e) = stdin.shutdown().await {
        debug!("Failed to close agent stdin: {}", e);
    }
}

fn collect_stderr_tail<R>(stderr: R) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        while matches!(reader.read_until(b'\n', &mut buf).await, Ok(n) if n > 0) {
            let line = String::from_utf8_lossy(&buf).trim_end().to_string();
            buf.clear();
            debug!(target: "agent_stderr", "{}", line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect()
    })
}

/// Parse one stdout line, tolerating an SSE `data:` prefix
pub(crate) fn parse_line(line: &str) -> Option<AgentEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let json = line.strip_prefix("data:").map(str::trim_start).unwrap_or(line);
    match AgentEvent::from_json(json) {
        Ok(event) => Some(event),
        Err(e) => {
            debug!("Ignoring non-event agent output ({}): {}", e, line);
            None
        }
    }
}

async fn pump_events<R>(
    mut child: Child,
    stdout: R,
    stderr_tail: Option<JoinHandle<Vec<String>>>,
    tx: mpsc::Sender<AgentEvent>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stdout);
    let mut buf = Vec::new();
    let mut forwarded = 0usize;
    let mut reported_error = false;

    loop {
        buf.clear();
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Turn cancelled, stopping agent");
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill agent: {}", e);
                }
                return;
            }
            read = reader.read_until(b'\n', &mut buf) => match read {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    let Some(event) = parse_line(&line) else { continue };
                    reported_error |= matches!(event, AgentEvent::Error(_));
                    forwarded += 1;
                    if tx.send(event).await.is_err() {
                        debug!("Event receiver dropped, stopping agent");
                        let _ = child.kill().await;
                        return;
                    }
                }
                Err(e) => {
                    warn!("Failed to read agent output: {}", e);
                    break;
                }
            }
        }
    }

    let status = tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.kill().await;
            return;
        }
        status = child.wait() => status,
    };

    match status {
        Ok(status) if status.success() => {
            info!(events = forwarded, "Agent exited cleanly");
        }
        Ok(status) => {
            let tail = match stderr_tail {
                Some(handle) => handle.await.unwrap_or_default(),
                None => Vec::new(),
            };
            let mut message = format!("Agent exited with {}", status);
            if !tail.is_empty() {
                message.push_str(": ");
                message.push_str(&tail.join("\n"));
            }
            if reported_error {
                // The agent already reported its own failure
                warn!("{} after reporting an error", message);
            } else {
                warn!("{}", message);
                let _ = tx.send(RelayError::process(message).to_event()).await;
            }
        }
        Err(e) => {
            let _ = tx
                .send(RelayError::process(format!("Failed to wait for agent: {}", e)).to_event())
                .await;
        }
    }
}
