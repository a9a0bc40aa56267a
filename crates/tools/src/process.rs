//! Session tools: read_output, force_terminate, list_sessions, prune_sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::OutputChunk;
use crate::directory;
use crate::error::{Result, ToolError};
use crate::handle::{signal_group, signal_tree, TreeSignal};
use crate::manager::{ProcessManager, ProcessSession, SessionInfo, SessionState};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadOutputRequest {
    pub session_id: String,
    /// Independent cursor name; omitted means the default reader.
    #[serde(default)]
    pub reader: Option<String>,
    /// Also return the stream-tagged chunks, not just the joined text.
    #[serde(default)]
    pub include_chunks: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadOutputResponse {
    pub session_id: String,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<Vec<OutputChunk>>,
    pub state: SessionState,
    pub exit_code: Option<i32>,
    pub missed_chunks: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForceTerminateRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TerminateResponse {
    pub session_id: String,
    pub state: SessionState,
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl TerminateResponse {
    fn from_session(s: &ProcessSession, warning: Option<String>) -> Self {
        Self {
            session_id: s.id.clone(),
            state: s.state,
            exit_code: s.exit_code,
            signal: s.signal,
            warning,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionInfo>,
    pub count: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PruneRequest {
    /// Prune just this session; omitted prunes every terminal session.
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PruneResponse {
    pub pruned: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handlers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Return output appended since this reader's last read.  Never blocks.
///
/// The state is sampled under the same lock as the output, and the monitor
/// only publishes a terminal state after draining both pipes, so a terminal
/// response always carries the final bytes.
pub fn read_output(manager: &ProcessManager, req: ReadOutputRequest) -> Result<ReadOutputResponse> {
    let slot = manager.require(&req.session_id)?;
    let reader = req.reader.as_deref().filter(|r| !r.is_empty());

    let mut s = slot.write();
    let slice = s.read_new(reader)?;
    if slice.missed > 0 {
        tracing::debug!(
            session_id = %s.id,
            missed = slice.missed,
            "reader fell behind the output cap"
        );
    }
    Ok(ReadOutputResponse {
        session_id: s.id.clone(),
        output: slice.text(),
        chunks: req.include_chunks.then(|| slice.chunks.clone()),
        state: s.state,
        exit_code: s.exit_code,
        missed_chunks: slice.missed,
    })
}

/// Terminate a session's whole process tree.
///
/// SIGTERM first, SIGKILL after `terminate_grace_ms`.  Idempotent: a
/// session that already finished is returned unchanged.
pub async fn force_terminate(
    manager: &ProcessManager,
    req: ForceTerminateRequest,
) -> Result<TerminateResponse> {
    let slot = manager.require(&req.session_id)?;
    let grace = Duration::from_millis(manager.config().terminate_grace_ms);

    let pid = {
        let mut s = slot.write();
        if s.state.is_terminal() {
            return Ok(TerminateResponse::from_session(&s, None));
        }
        s.terminating = true;
        s.pid
    };

    let tree = directory::descendants(pid).await;
    let sent = signal_tree(pid, &tree, TreeSignal::Terminate).await;
    tracing::info!(
        session_id = %req.session_id,
        pid,
        descendants = tree.len(),
        sent,
        "terminate requested"
    );

    let mut warning = None;
    if slot.wait_terminal(grace).await.is_terminal() {
        // The shell is reaped: its pid and the old snapshot may already
        // name other processes.  Only the group is still ours.
        signal_group(pid, TreeSignal::Kill).await;
    } else {
        let tree = directory::descendants(pid).await;
        tracing::warn!(
            session_id = %req.session_id,
            pid,
            descendants = tree.len(),
            "grace period elapsed; escalating to kill"
        );
        signal_tree(pid, &tree, TreeSignal::Kill).await;

        if !slot.wait_terminal(grace).await.is_terminal() {
            let timeout = ToolError::TerminationTimeout {
                session_id: req.session_id.clone(),
            };
            tracing::warn!(session_id = %req.session_id, pid, "{timeout}");
            slot.finish(SessionState::Terminated, None, None);
            warning = Some(timeout.to_string());
        }
    }

    let s = slot.read();
    Ok(TerminateResponse::from_session(&s, warning))
}

/// Snapshot of every session, oldest first.
pub fn list_sessions(manager: &ProcessManager) -> SessionList {
    let sessions = manager.list();
    SessionList {
        count: sessions.len(),
        sessions,
    }
}

/// Drop terminal sessions from the registry.
pub fn prune_sessions(manager: &ProcessManager, req: PruneRequest) -> Result<PruneResponse> {
    let pruned = match req.session_id {
        Some(id) => {
            manager.remove_terminal(&id)?;
            1
        }
        None => manager.clear_finished(),
    };
    if pruned > 0 {
        tracing::debug!(pruned, "sessions pruned");
    }
    Ok(PruneResponse { pruned })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
