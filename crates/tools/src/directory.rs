//! Read-only, point-in-time view over every OS process.
//!
//! Snapshots are never cached: pids and resource usage are only
//! meaningful at the moment they are taken.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::error::{Result, ToolError};

#[derive(Debug, Clone, Serialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub parent_pid: Option<u32>,
    pub name: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessList {
    pub processes: Vec<ProcessEntry>,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KillRequest {
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct KillResponse {
    pub pid: u32,
    pub killed: bool,
}

/// Snapshot all processes system-wide, sorted by pid.
///
/// Takes two samples `MINIMUM_CPU_UPDATE_INTERVAL` apart so `cpu_percent`
/// reflects recent usage.  Processes that exit between the samples are
/// simply absent.
pub async fn list_processes() -> Result<Vec<ProcessEntry>> {
    tokio::task::spawn_blocking(|| {
        let mut sys = System::new();
        sys.refresh_processes();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        sys.refresh_processes();

        let mut entries: Vec<ProcessEntry> = sys
            .processes()
            .iter()
            .map(|(pid, p)| ProcessEntry {
                pid: pid.as_u32(),
                parent_pid: p.parent().map(|pp| pp.as_u32()),
                name: p.name().to_owned(),
                cpu_percent: p.cpu_usage(),
                memory_bytes: p.memory(),
            })
            .collect();
        entries.sort_by_key(|e| e.pid);
        entries
    })
    .await
    .map_err(|e| ToolError::Directory(e.to_string()))
}

/// Every live descendant of `root` (children, grandchildren, ...).
///
/// Best-effort: a failed snapshot yields an empty list and the caller
/// falls back to signalling the process group alone.
pub async fn descendants(root: u32) -> Vec<u32> {
    let table = tokio::task::spawn_blocking(parent_table).await;
    match table {
        Ok(table) => descendants_in(&table, root),
        Err(e) => {
            tracing::debug!(root, error = %e, "descendant snapshot failed");
            Vec::new()
        }
    }
}

fn parent_table() -> Vec<(u32, Option<u32>)> {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.processes()
        .iter()
        .map(|(pid, p)| (pid.as_u32(), p.parent().map(|pp| pp.as_u32())))
        .collect()
}

/// Breadth-first walk of `(pid, parent)` pairs starting below `root`.
pub fn descendants_in(table: &[(u32, Option<u32>)], root: u32) -> Vec<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for &(pid, parent) in table {
        if let Some(parent) = parent {
            if parent != pid {
                children.entry(parent).or_default().push(pid);
            }
        }
    }

    let mut out = Vec::new();
    let mut queue = VecDeque::from([root]);
    while let Some(pid) = queue.pop_front() {
        if let Some(kids) = children.get(&pid) {
            for &kid in kids {
                if kid != root && !out.contains(&kid) {
                    out.push(kid);
                    queue.push_back(kid);
                }
            }
        }
    }
    out
}

/// Reject pids that would address a process group or this service.
///
/// Pids past `i32::MAX` can never name a live process, so they are
/// reported as missing without sending anything.
fn check_target(pid: u32) -> Result<()> {
    if pid == 0 {
        return Err(ToolError::InvalidArgument("pid 0 addresses a process group".into()));
    }
    if pid > i32::MAX as u32 {
        return Err(ToolError::ProcessNotFound(pid));
    }
    if pid == std::process::id() {
        return Err(ToolError::InvalidArgument(format!(
            "pid {pid} is this service; refusing to kill it"
        )));
    }
    Ok(())
}

/// Forcefully kill exactly `pid` (no tree discovery).
#[cfg(unix)]
pub async fn kill_process(pid: u32) -> Result<KillResponse> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    check_target(pid)?;
    match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
        Ok(()) => {
            tracing::info!(pid, "process killed");
            Ok(KillResponse { pid, killed: true })
        }
        Err(Errno::ESRCH) => Err(ToolError::ProcessNotFound(pid)),
        Err(Errno::EPERM) => Err(ToolError::PermissionDenied { pid }),
        Err(e) => Err(ToolError::Signal {
            pid,
            reason: e.to_string(),
        }),
    }
}

#[cfg(not(unix))]
pub async fn kill_process(pid: u32) -> Result<KillResponse> {
    check_target(pid)?;
    let outcome = tokio::task::spawn_blocking(move || {
        let mut sys = System::new();
        sys.refresh_processes();
        sys.process(sysinfo::Pid::from_u32(pid)).map(|p| p.kill())
    })
    .await
    .map_err(|e| ToolError::Directory(e.to_string()))?;

    match outcome {
        Some(true) => {
            tracing::info!(pid, "process killed");
            Ok(KillResponse { pid, killed: true })
        }
        Some(false) => Err(ToolError::PermissionDenied { pid }),
        None => Err(ToolError::ProcessNotFound(pid)),
    }
}
