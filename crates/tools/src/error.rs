/// Failures surfaced by the command and process tools.
///
/// Every variant carries enough context (session id, pid, shell) for the
/// caller to tell "nothing happened" apart from "partially happened".
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("command blocked by security policy: {command}")]
    CommandBlocked { command: String },

    #[error("failed to spawn command with shell '{shell}': {reason}")]
    SpawnFailure { shell: String, reason: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("no such process: pid {0}")]
    ProcessNotFound(u32),

    #[error("permission denied signalling pid {pid}")]
    PermissionDenied { pid: u32 },

    #[error("signalling pid {pid} failed: {reason}")]
    Signal { pid: u32, reason: String },

    #[error("session {session_id} did not confirm exit after SIGKILL; marked terminated")]
    TerminationTimeout { session_id: String },

    #[error("process snapshot failed: {0}")]
    Directory(String),
}

impl ToolError {
    /// Stable machine-readable tag for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::InvalidArgument(_) => "invalid_argument",
            ToolError::CommandBlocked { .. } => "command_blocked",
            ToolError::SpawnFailure { .. } => "spawn_failure",
            ToolError::SessionNotFound(_) => "session_not_found",
            ToolError::ProcessNotFound(_) => "process_not_found",
            ToolError::PermissionDenied { .. } => "permission_denied",
            ToolError::Signal { .. } => "signal_failed",
            ToolError::TerminationTimeout { .. } => "termination_timeout",
            ToolError::Directory(_) => "directory_failed",
        }
    }
}

pub type Result<T> = std::result::Result<T, ToolError>;
