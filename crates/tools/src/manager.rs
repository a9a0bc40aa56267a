//! In-memory session registry.
//!
//! Tracks every command session, its output buffer, and its lifecycle.
//! The registry owns no child processes directly: each spawn creates a
//! background tokio task that writes into the shared [`SessionSlot`].
//!
//! Locking is two-level.  The map lock is only held to look up, insert,
//! or remove a slot; all state and output changes take the per-session
//! lock, so appends on one session never block reads of another.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use regex::RegexSet;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use dc_domain::config::{ExecConfig, ExecSecurityConfig, ToolsConfig};

use crate::buffer::{OutputBuffer, OutputSlice};
use crate::error::{Result, ToolError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Running,
    Completed,
    Failed,
    Terminated,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

/// Cursor key used when a caller does not identify itself.
pub const DEFAULT_READER: &str = "default";

/// Named cursors a single session will track, the default reader included.
pub const MAX_READERS: usize = 32;

/// Mutable state for a single command session.
pub struct ProcessSession {
    pub id: String,
    pub command: String,
    pub shell: String,
    pub pid: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub state: SessionState,
    pub exit_code: Option<i32>,
    /// Terminating signal, when the OS reports one.
    pub signal: Option<i32>,
    pub output: OutputBuffer,
    /// Set by force_terminate so a racing natural exit is recorded as
    /// `terminated`.
    pub terminating: bool,
    seq: u64,
    cursors: HashMap<String, u64>,
}

impl ProcessSession {
    pub fn new(id: String, command: String, shell: String, pid: u32, max_output_bytes: usize) -> Self {
        Self {
            id,
            command,
            shell,
            pid,
            started_at: Utc::now(),
            finished_at: None,
            state: SessionState::Running,
            exit_code: None,
            signal: None,
            output: OutputBuffer::new(max_output_bytes),
            terminating: false,
            seq: 0,
            cursors: HashMap::new(),
        }
    }

    /// Return everything `reader` has not seen yet and advance its cursor.
    ///
    /// A new reader name is refused once the session already tracks
    /// [`MAX_READERS`] cursors.  The default reader is always accepted.
    pub fn read_new(&mut self, reader: Option<&str>) -> Result<OutputSlice> {
        let key = reader.unwrap_or(DEFAULT_READER);
        let cursor = match self.cursors.get(key) {
            Some(&cursor) => cursor,
            None if key != DEFAULT_READER && self.named_readers() >= MAX_READERS - 1 => {
                return Err(ToolError::InvalidArgument(format!(
                    "session {} reached its limit of {MAX_READERS} readers",
                    self.id
                )));
            }
            None => 0,
        };
        let slice = self.output.read_from(cursor);
        self.cursors.insert(key.to_owned(), slice.next);
        Ok(slice)
    }

    fn named_readers(&self) -> usize {
        self.cursors.keys().filter(|k| *k != DEFAULT_READER).count()
    }

    /// Apply a terminal transition.  Returns `false` (and changes nothing)
    /// when the session already left `running`.
    fn finish(&mut self, state: SessionState, exit_code: Option<i32>, signal: Option<i32>) -> bool {
        if self.state.is_terminal() || !state.is_terminal() {
            return false;
        }
        self.state = state;
        self.exit_code = exit_code;
        self.signal = signal;
        self.finished_at = Some(Utc::now());
        true
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            command: self.command.clone(),
            shell: self.shell.clone(),
            pid: self.pid,
            state: self.state,
            exit_code: self.exit_code,
            started_at: self.started_at,
            finished_at: self.finished_at,
            output_bytes: self.output.len_bytes(),
        }
    }
}

/// A registered session plus the channel that announces its terminal state.
pub struct SessionSlot {
    session: RwLock<ProcessSession>,
    state_tx: watch::Sender<SessionState>,
}

impl SessionSlot {
    fn new(session: ProcessSession) -> Self {
        let (state_tx, _) = watch::channel(session.state);
        Self {
            session: RwLock::new(session),
            state_tx,
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, ProcessSession> {
        self.session.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, ProcessSession> {
        self.session.write()
    }

    pub fn state(&self) -> SessionState {
        self.session.read().state
    }

    /// Move the session to a terminal state and wake every waiter.
    /// Only the first terminal transition wins.
    pub fn finish(&self, state: SessionState, exit_code: Option<i32>, signal: Option<i32>) -> bool {
        let changed = self.session.write().finish(state, exit_code, signal);
        if changed {
            self.state_tx.send_replace(state);
        }
        changed
    }

    /// Wait up to `timeout` for the session to become terminal and return
    /// whatever state it is in at that point.
    pub async fn wait_terminal(&self, timeout: Duration) -> SessionState {
        let mut rx = self.state_tx.subscribe();
        let state = match tokio::time::timeout(timeout, rx.wait_for(|s| s.is_terminal())).await {
            Ok(Ok(state)) => *state,
            _ => self.state(),
        };
        state
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ProcessManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registry of all running and finished sessions.
pub struct ProcessManager {
    sessions: RwLock<HashMap<String, Arc<SessionSlot>>>,
    next_seq: AtomicU64,
    config: ExecConfig,
    security: ExecSecurityConfig,
    denied: RegexSet,
}

impl ProcessManager {
    /// Build a registry.  Fails when a denied pattern does not compile.
    pub fn new(config: ToolsConfig) -> std::result::Result<Self, regex::Error> {
        let denied = RegexSet::new(&config.exec_security.denied_patterns)?;
        Ok(Self {
            sessions: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            config: config.exec,
            security: config.exec_security,
            denied,
        })
    }

    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    pub fn security(&self) -> &ExecSecurityConfig {
        &self.security
    }

    /// Whether `command` matches the denylist.
    pub fn is_denied(&self, command: &str) -> bool {
        self.denied.is_match(command)
    }

    /// Register a new session.
    pub fn register(&self, mut session: ProcessSession) -> Arc<SessionSlot> {
        session.seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = session.id.clone();
        let slot = Arc::new(SessionSlot::new(session));
        self.sessions.write().insert(id, slot.clone());
        slot
    }

    /// Get a session by ID.
    pub fn get(&self, id: &str) -> Option<Arc<SessionSlot>> {
        self.sessions.read().get(id).cloned()
    }

    /// Look up a session or fail with `SessionNotFound`.
    pub fn require(&self, id: &str) -> Result<Arc<SessionSlot>> {
        self.get(id).ok_or_else(|| ToolError::SessionNotFound(id.to_owned()))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Snapshot of every session, oldest first.
    pub fn list(&self) -> Vec<SessionInfo> {
        let slots: Vec<Arc<SessionSlot>> = self.sessions.read().values().cloned().collect();
        let mut rows: Vec<(u64, SessionInfo)> = slots
            .iter()
            .map(|slot| {
                let s = slot.read();
                (s.seq, s.info())
            })
            .collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, info)| info).collect()
    }

    /// Ids of sessions still in `running`.
    pub fn running_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .iter()
            .filter(|(_, slot)| slot.state() == SessionState::Running)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Remove one terminal session.  Running sessions are left alone.
    pub fn remove_terminal(&self, id: &str) -> Result<()> {
        let mut sessions = self.sessions.write();
        let slot = sessions
            .get(id)
            .ok_or_else(|| ToolError::SessionNotFound(id.to_owned()))?;
        if !slot.state().is_terminal() {
            return Err(ToolError::InvalidArgument(format!(
                "session {id} is still running; force_terminate it first"
            )));
        }
        sessions.remove(id);
        Ok(())
    }

    /// Remove all terminal sessions.
    pub fn clear_finished(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, slot| !slot.state().is_terminal());
        before - sessions.len()
    }

    /// Remove terminal sessions that finished more than `cleanup_ms` ago.
    pub fn cleanup_stale(&self) -> usize {
        let cutoff_ms = self.config.cleanup_ms as i64;
        let now = Utc::now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, slot| {
            let s = slot.read();
            match s.finished_at {
                Some(finished) => now.signed_duration_since(finished).num_milliseconds() < cutoff_ms,
                None => true,
            }
        });
        before - sessions.len()
    }
}

/// Summary of a session (returned by list_sessions).
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub command: String,
    pub shell: String,
    pub pid: u32,
    pub state: SessionState,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub output_bytes: usize,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
