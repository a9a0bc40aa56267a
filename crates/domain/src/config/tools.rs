use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools (execute_command / sessions / processes)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Configuration for the command-execution and process tools.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub exec: ExecConfig,
    #[serde(default)]
    pub exec_security: ExecSecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecConfig {
    /// Shell used when a request does not name one.
    #[serde(default = "d_shell")]
    pub default_shell: String,
    /// How long `execute_command` waits for the process before returning
    /// a still-running session (ms).
    #[serde(default = "d_1000")]
    pub default_timeout_ms: u64,
    /// How long `force_terminate` waits after each signal round before
    /// escalating or giving up (ms).
    #[serde(default = "d_1000")]
    pub terminate_grace_ms: u64,
    /// How long to keep draining pipes after the child has exited (ms).
    /// Background grandchildren may hold the pipes open indefinitely.
    #[serde(default = "d_500")]
    pub drain_timeout_ms: u64,
    /// Max output bytes kept per session; the oldest chunks are dropped first.
    #[serde(default = "d_1000000")]
    pub max_output_bytes: usize,
    /// TTL for finished sessions before the sweeper prunes them (ms).
    #[serde(default = "d_1800000")]
    pub cleanup_ms: u64,
    /// Interval between sweeper runs (seconds).
    #[serde(default = "d_60")]
    pub sweep_interval_sec: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            default_shell: d_shell(),
            default_timeout_ms: 1000,
            terminate_grace_ms: 1000,
            drain_timeout_ms: 500,
            max_output_bytes: 1_000_000,
            cleanup_ms: 1_800_000,
            sweep_interval_sec: 60,
        }
    }
}

/// Security configuration for execute_command: audit logging and command denylist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecSecurityConfig {
    /// Log every command at INFO level.
    #[serde(default = "d_true")]
    pub audit_log: bool,
    /// Regex patterns that are denied. Commands matching any pattern are rejected.
    #[serde(default = "d_denied_patterns")]
    pub denied_patterns: Vec<String>,
}

impl Default for ExecSecurityConfig {
    fn default() -> Self {
        Self {
            audit_log: true,
            denied_patterns: d_denied_patterns(),
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_shell() -> String {
    if cfg!(windows) {
        "cmd.exe".into()
    } else {
        "/bin/sh".into()
    }
}
fn d_60() -> u64 {
    60
}
fn d_500() -> u64 {
    500
}
fn d_1000() -> u64 {
    1000
}
fn d_1800000() -> u64 {
    1_800_000
}
fn d_1000000() -> usize {
    1_000_000
}
fn d_true() -> bool {
    true
}
fn d_denied_patterns() -> Vec<String> {
    vec![
        r"rm\s+-rf\s+/(\s|$)".into(),
        r"mkfs\.".into(),
        r"dd\s+if=.+of=/dev/".into(),
    ]
}
