//! execute_command: bounded-wait command execution.
//!
//! - Spawn the command under a shell and register a `running` session.
//! - Wait up to `timeout_ms` for it to finish.
//! - Finished in time: return the full output and the terminal state.
//! - Still running: return what has accumulated so far plus the session id.
//!   The process keeps running; callers poll with read_output.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::buffer::{Stream, Utf8Decoder};
use crate::error::{Result, ToolError};
use crate::handle::ProcessHandle;
use crate::manager::{ProcessManager, ProcessSession, SessionSlot, SessionState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecRequest {
    pub command: String,
    /// Shell to run the command under (defaults to the configured shell).
    #[serde(default)]
    pub shell: Option<String>,
    /// How long to wait before returning a still-running session (ms).
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecResponse {
    pub session_id: String,
    pub pid: u32,
    pub output: String,
    pub state: SessionState,
    pub exit_code: Option<i32>,
    /// Chunks evicted by the output cap before this response was built.
    pub missed_chunks: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Exec logic
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Size of a single pipe read.
const READ_CHUNK: usize = 8 * 1024;

/// Run a command and wait at most `timeout_ms` for it.
///
/// The output returned here counts as read for the default reader, so a
/// following read_output only yields what arrived afterwards.
pub async fn exec(manager: &ProcessManager, req: ExecRequest) -> Result<ExecResponse> {
    let cfg = manager.config();

    let command = req.command.trim();
    if command.is_empty() {
        return Err(ToolError::InvalidArgument("command must not be empty".into()));
    }
    let shell = req
        .shell
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(cfg.default_shell.as_str())
        .to_owned();
    let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(cfg.default_timeout_ms));

    if manager.is_denied(command) {
        tracing::warn!(command = %command, "command denied by denylist");
        return Err(ToolError::CommandBlocked {
            command: command.to_owned(),
        });
    }
    if manager.security().audit_log {
        tracing::info!(command = %command, shell = %shell, "execute_command invoked");
    }

    let handle = ProcessHandle::spawn(&shell, command).map_err(|e| {
        tracing::warn!(shell = %shell, error = %e, "spawn failed");
        ToolError::SpawnFailure {
            shell: shell.clone(),
            reason: e.to_string(),
        }
    })?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let pid = handle.pid();
    let slot = manager.register(ProcessSession::new(
        session_id.clone(),
        command.to_owned(),
        shell,
        pid,
        cfg.max_output_bytes,
    ));
    tracing::debug!(session_id = %session_id, pid, "session started");

    spawn_monitor(handle, slot.clone(), Duration::from_millis(cfg.drain_timeout_ms));

    let state = slot.wait_terminal(timeout).await;

    let mut s = slot.write();
    let slice = s.read_new(None)?;
    if slice.missed > 0 {
        tracing::debug!(session_id = %session_id, missed = slice.missed, "output cap evicted chunks");
    }
    Ok(ExecResponse {
        session_id,
        pid,
        output: slice.text(),
        state,
        exit_code: if state.is_terminal() { s.exit_code } else { None },
        missed_chunks: slice.missed,
    })
}

/// Spawn the detached task that owns the child until it exits.
///
/// Both pipes are copied into the session buffer as bytes arrive.  Once
/// the child exits the readers get `drain` to reach EOF (a background
/// grandchild can keep a pipe open forever), then the exit is classified
/// and published.
fn spawn_monitor(mut handle: ProcessHandle, slot: Arc<SessionSlot>, drain: Duration) {
    let stdout = handle.take_stdout();
    let stderr = handle.take_stderr();

    tokio::spawn(async move {
        let stdout_task = tokio::spawn(pump(stdout, Stream::Stdout, slot.clone()));
        let stderr_task = tokio::spawn(pump(stderr, Stream::Stderr, slot.clone()));
        let stdout_abort = stdout_task.abort_handle();
        let stderr_abort = stderr_task.abort_handle();

        let result = handle.wait().await;

        let drained = tokio::time::timeout(drain, async {
            let _ = stdout_task.await;
            let _ = stderr_task.await;
        })
        .await;
        if drained.is_err() {
            stdout_abort.abort();
            stderr_abort.abort();
            tracing::debug!(pid = handle.pid(), "pipes still open after exit; stopped reading");
        }

        let terminating = slot.read().terminating;
        let (state, exit_code, signal) = match result {
            Ok(status) => {
                let signal = exit_signal(&status);
                let state = if terminating {
                    SessionState::Terminated
                } else if status.success() {
                    SessionState::Completed
                } else {
                    SessionState::Failed
                };
                (state, status.code(), signal)
            }
            Err(e) => {
                slot.write()
                    .output
                    .push(Stream::Stderr, format!("\n[process error: {e}]"));
                let state = if terminating {
                    SessionState::Terminated
                } else {
                    SessionState::Failed
                };
                (state, None, None)
            }
        };

        if slot.finish(state, exit_code, signal) {
            let s = slot.read();
            tracing::debug!(
                session_id = %s.id,
                pid = s.pid,
                state = ?state,
                exit_code = ?exit_code,
                signal = ?signal,
                "session finished"
            );
        }
    });
}

/// Copy one pipe into the session buffer until EOF.
async fn pump<R>(reader: Option<R>, stream: Stream, slot: Arc<SessionSlot>)
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return;
    };
    let mut decoder = Utf8Decoder::default();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                let text = decoder.decode(&buf[..n]);
                slot.write().output.push(stream, text);
            }
            Err(e) => {
                tracing::debug!(stream = ?stream, error = %e, "pipe read failed");
                break;
            }
        }
    }
    let tail = decoder.finish();
    slot.write().output.push(stream, tail);
}

#[cfg(unix)]
fn exit_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
