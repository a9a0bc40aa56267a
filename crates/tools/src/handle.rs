//! Thin cross-platform wrapper around a shell child process.
//!
//! On unix the child is placed in its own process group so the whole
//! tree it spawns can be signalled at once with `killpg`.  Windows relies
//! on `taskkill /T`.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdout, Command};

/// Arguments placed between the shell and the command string.
pub fn shell_args(shell: &str) -> &'static [&'static str] {
    let stem = Path::new(shell)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(shell)
        .to_ascii_lowercase();
    match stem.as_str() {
        "cmd" => &["/C"],
        "powershell" | "pwsh" => &["-NoProfile", "-Command"],
        _ => &["-c"],
    }
}

/// A live child process attached to a shell.
pub struct ProcessHandle {
    child: Child,
    pid: u32,
}

impl ProcessHandle {
    /// Start `command` under `shell` with stdin closed and both output
    /// streams piped.
    pub fn spawn(shell: &str, command: &str) -> io::Result<Self> {
        let mut cmd = Command::new(shell);
        cmd.args(shell_args(shell)).arg(command);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child
            .id()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child exited before its pid was read"))?;
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the process to exit and collect its status.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Signal delivered to a process tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeSignal {
    /// Polite request (SIGTERM / `taskkill /T`).
    Terminate,
    /// Unconditional (SIGKILL / `taskkill /T /F`).
    Kill,
}

/// Signal `root`, its process group, and every pid in `descendants`.
///
/// Processes that are already gone are skipped.  Returns the number of
/// signals that were actually delivered.
#[cfg(unix)]
pub async fn signal_tree(root: u32, descendants: &[u32], sig: TreeSignal) -> usize {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let signal = unix_signal(sig);
    let mut delivered = signal_group(root, sig).await;

    for &pid in descendants.iter().chain(std::iter::once(&root)) {
        if pid == 0 || pid > i32::MAX as u32 {
            continue;
        }
        match kill(Pid::from_raw(pid as i32), signal) {
            Ok(()) => delivered += 1,
            Err(Errno::ESRCH) => {}
            Err(e) => tracing::debug!(pid, error = %e, "kill failed"),
        }
    }

    delivered
}

/// Signal only the process group led by `pgid`.
///
/// Safe after the leader has been reaped: the kernel does not hand out a
/// pid that still names a live process group.
#[cfg(unix)]
pub async fn signal_group(pgid: u32, sig: TreeSignal) -> usize {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    if pgid == 0 || pgid > i32::MAX as u32 {
        return 0;
    }
    match killpg(Pid::from_raw(pgid as i32), unix_signal(sig)) {
        Ok(()) => 1,
        Err(Errno::ESRCH) => 0,
        Err(e) => {
            tracing::debug!(pgid, error = %e, "killpg failed");
            0
        }
    }
}

#[cfg(unix)]
fn unix_signal(sig: TreeSignal) -> nix::sys::signal::Signal {
    use nix::sys::signal::Signal;
    match sig {
        TreeSignal::Terminate => Signal::SIGTERM,
        TreeSignal::Kill => Signal::SIGKILL,
    }
}

#[cfg(windows)]
pub async fn signal_tree(root: u32, _descendants: &[u32], sig: TreeSignal) -> usize {
    let mut cmd = Command::new("taskkill");
    cmd.args(["/PID", &root.to_string(), "/T"]);
    if sig == TreeSignal::Kill {
        cmd.arg("/F");
    }
    match cmd.output().await {
        Ok(out) if out.status.success() => 1,
        Ok(out) => {
            tracing::debug!(
                pid = root,
                stderr = %String::from_utf8_lossy(&out.stderr),
                "taskkill failed"
            );
            0
        }
        Err(e) => {
            tracing::debug!(pid = root, error = %e, "taskkill could not be started");
            0
        }
    }
}

/// Windows has no process groups; `taskkill /T` walks whatever tree is left.
#[cfg(windows)]
pub async fn signal_group(pgid: u32, sig: TreeSignal) -> usize {
    signal_tree(pgid, &[], sig).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn posix_shells_use_dash_c() {
        assert_eq!(shell_args("/bin/sh"), &["-c"]);
        assert_eq!(shell_args("bash"), &["-c"]);
        assert_eq!(shell_args("/usr/bin/zsh"), &["-c"]);
    }

    #[test]
    fn windows_shells_get_their_own_flags() {
        assert_eq!(shell_args("cmd.exe"), &["/C"]);
        assert_eq!(shell_args("CMD"), &["/C"]);
        assert_eq!(shell_args("pwsh"), &["-NoProfile", "-Command"]);
        assert_eq!(shell_args("powershell.exe"), &["-NoProfile", "-Command"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn spawn_reports_pid_and_exit() {
        let mut handle = ProcessHandle::spawn("/bin/sh", "exit 3").unwrap();
        assert!(handle.pid() > 0);
        let status = handle.wait().await.unwrap();
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn missing_shell_fails_to_spawn() {
        let result = ProcessHandle::spawn("/definitely/not/a/shell", "true");
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tree_kill_stops_the_group() {
        let mut handle = ProcessHandle::spawn("/bin/sh", "sleep 30 & sleep 30").unwrap();
        let pid = handle.pid();
        let delivered = signal_tree(pid, &[], TreeSignal::Kill).await;
        assert!(delivered >= 1);
        let status = tokio::time::timeout(std::time::Duration::from_secs(5), handle.wait())
            .await
            .expect("child should die")
            .unwrap();
        assert!(!status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn group_signal_outlives_the_leader() {
        // The leader exits at once; its backgrounded child keeps the group alive.
        let mut handle =
            ProcessHandle::spawn("/bin/sh", "sleep 30 >/dev/null 2>&1 &").unwrap();
        let pgid = handle.pid();
        handle.wait().await.unwrap();
        assert_eq!(signal_group(pgid, TreeSignal::Kill).await, 1);
    }

    #[cfg(windows)]
    #[tokio::test]
    async fn taskkill_on_a_missing_pid_delivers_nothing() {
        assert_eq!(signal_tree(4_294_967_000, &[], TreeSignal::Kill).await, 0);
    }
}
