#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use dc_domain::config::ToolsConfig;
use sysinfo::{Pid, ProcessStatus, System};
use dc_tools::directory;
use dc_tools::exec::{exec, ExecRequest};
use dc_tools::manager::SessionState;
use dc_tools::process::{
    force_terminate, list_sessions, prune_sessions, read_output, ForceTerminateRequest,
    PruneRequest, ReadOutputRequest,
};
use dc_tools::{ProcessManager, ToolError};

fn manager() -> ProcessManager {
    let mut cfg = ToolsConfig::default();
    cfg.exec.default_shell = "/bin/sh".into();
    cfg.exec.terminate_grace_ms = 500;
    ProcessManager::new(cfg).unwrap()
}

fn run(command: &str, timeout_ms: u64) -> ExecRequest {
    ExecRequest {
        command: command.into(),
        shell: None,
        timeout_ms: Some(timeout_ms),
    }
}

fn read(m: &ProcessManager, id: &str) -> dc_tools::process::ReadOutputResponse {
    read_output(
        m,
        ReadOutputRequest {
            session_id: id.into(),
            reader: None,
            include_chunks: false,
        },
    )
    .unwrap()
}

fn terminate(id: &str) -> ForceTerminateRequest {
    ForceTerminateRequest {
        session_id: id.into(),
    }
}

/// Poll until the session leaves `running` or `deadline` passes.
async fn read_until_done(m: &ProcessManager, id: &str, deadline: Duration) -> (String, SessionState) {
    let mut all = String::new();
    let start = tokio::time::Instant::now();
    loop {
        let r = read(m, id);
        all.push_str(&r.output);
        if r.state.is_terminal() || start.elapsed() > deadline {
            return (all, r.state);
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

/// Live and not a zombie waiting for its parent to reap it.
fn alive(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes();
    sys.process(Pid::from_u32(pid))
        .is_some_and(|p| p.status() != ProcessStatus::Zombie)
}

#[tokio::test]
async fn echo_hello_completes() {
    let m = manager();
    let resp = exec(&m, run("echo hello", 5000)).await.unwrap();
    assert_eq!(resp.state, SessionState::Completed);
    assert_eq!(resp.exit_code, Some(0));
    assert_eq!(resp.output, "hello\n");

    let sessions = list_sessions(&m);
    assert_eq!(sessions.count, 1);
    assert_eq!(sessions.sessions[0].state, SessionState::Completed);
}

#[tokio::test]
async fn short_timeout_then_poll_to_completion() {
    let m = manager();
    let resp = exec(&m, run("sleep 1; echo done", 100)).await.unwrap();
    assert_eq!(resp.state, SessionState::Running);
    assert_eq!(resp.exit_code, None);

    let (output, state) = read_until_done(&m, &resp.session_id, Duration::from_secs(10)).await;
    assert_eq!(state, SessionState::Completed);
    assert!(output.contains("done"));
}

#[tokio::test]
async fn zero_timeout_returns_immediately() {
    let m = manager();
    let started = std::time::Instant::now();
    let resp = exec(&m, run("sleep 5", 0)).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(resp.state, SessionState::Running);
    force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
}

#[tokio::test]
async fn terminate_is_idempotent_and_visible_to_readers() {
    let m = manager();
    let resp = exec(&m, run("sleep 30", 50)).await.unwrap();
    assert_eq!(resp.state, SessionState::Running);

    let first = force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
    assert_eq!(first.state, SessionState::Terminated);
    assert!(first.warning.is_none());

    let second = force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
    assert_eq!(second.state, SessionState::Terminated);

    assert_eq!(read(&m, &resp.session_id).state, SessionState::Terminated);
    assert!(!alive(resp.pid));
}

#[tokio::test]
async fn sigterm_ignoring_process_is_killed() {
    let m = manager();
    let resp = exec(&m, run("trap '' TERM; sleep 30", 100)).await.unwrap();
    let out = force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
    assert_eq!(out.state, SessionState::Terminated);
    assert!(!alive(resp.pid));
}

#[tokio::test]
async fn output_is_read_exactly_once() {
    let m = manager();
    let resp = exec(&m, run("for i in 1 2 3 4 5; do echo line$i; sleep 0.1; done", 150))
        .await
        .unwrap();
    let mut all = resp.output.clone();
    let (rest, state) = read_until_done(&m, &resp.session_id, Duration::from_secs(10)).await;
    all.push_str(&rest);

    assert_eq!(state, SessionState::Completed);
    assert_eq!(all, "line1\nline2\nline3\nline4\nline5\n");
}

#[tokio::test]
async fn stderr_and_stdout_share_one_log() {
    let m = manager();
    let resp = exec(&m, run("echo out; echo err >&2; exit 2", 5000)).await.unwrap();
    assert_eq!(resp.state, SessionState::Failed);
    assert_eq!(resp.exit_code, Some(2));
    assert!(resp.output.contains("out\n"));
    assert!(resp.output.contains("err\n"));
}

#[tokio::test]
async fn spawn_failure_leaves_no_session() {
    let m = manager();
    let err = exec(
        &m,
        ExecRequest {
            command: "true".into(),
            shell: Some("/nonexistent/shell".into()),
            timeout_ms: Some(100),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ToolError::SpawnFailure { .. }));
    assert_eq!(list_sessions(&m).count, 0);
}

#[tokio::test]
async fn blocked_command_leaves_no_session() {
    let m = manager();
    let err = exec(&m, run("mkfs.ext4 /dev/sda1", 100)).await.unwrap_err();
    assert!(matches!(err, ToolError::CommandBlocked { .. }));
    assert_eq!(list_sessions(&m).count, 0);
}

#[tokio::test]
async fn kill_missing_pid_changes_nothing() {
    let m = manager();
    exec(&m, run("true", 5000)).await.unwrap();
    let before = list_sessions(&m);

    let err = directory::kill_process(2_147_483_000).await.unwrap_err();
    assert!(matches!(err, ToolError::ProcessNotFound(_)));

    let after = list_sessions(&m);
    assert_eq!(before.count, after.count);
    assert_eq!(before.sessions[0].state, after.sessions[0].state);
}

#[tokio::test]
async fn kill_process_fails_the_session_eventually() {
    let m = manager();
    let resp = exec(&m, run("exec sleep 30", 100)).await.unwrap();
    let killed = directory::kill_process(resp.pid).await.unwrap();
    assert!(killed.killed);

    let (_, state) = read_until_done(&m, &resp.session_id, Duration::from_secs(5)).await;
    assert_eq!(state, SessionState::Failed);
    let info = &list_sessions(&m).sessions[0];
    assert_eq!(info.exit_code, None);
}

#[tokio::test]
async fn terminate_reaches_background_grandchild() {
    let m = manager();
    let resp = exec(&m, run("sleep 30 & echo $!; wait", 300)).await.unwrap();
    let grandchild: u32 = resp.output.trim().parse().unwrap();
    assert!(alive(grandchild));

    let out = force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
    assert_eq!(out.state, SessionState::Terminated);

    // Give init a moment to reap the orphan.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!alive(grandchild));
}

#[tokio::test]
async fn list_processes_sees_running_session() {
    let m = manager();
    let resp = exec(&m, run("sleep 30", 50)).await.unwrap();
    let procs = directory::list_processes().await.unwrap();
    assert!(procs.iter().any(|p| p.pid == resp.pid));
    force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
}

#[tokio::test]
async fn prune_removes_finished_only() {
    let m = manager();
    exec(&m, run("true", 5000)).await.unwrap();
    let live = exec(&m, run("sleep 30", 50)).await.unwrap();

    let pruned = prune_sessions(&m, PruneRequest::default()).unwrap();
    assert_eq!(pruned.pruned, 1);
    let left = list_sessions(&m);
    assert_eq!(left.count, 1);
    assert_eq!(left.sessions[0].id, live.session_id);

    force_terminate(&m, terminate(&live.session_id)).await.unwrap();
}

#[tokio::test]
async fn group_member_ignoring_sigterm_dies_after_shell_exits() {
    let m = manager();
    // The shell dies on SIGTERM; the background job in its group does not.
    let resp = exec(
        &m,
        run("(trap '' TERM; sleep 30) >/dev/null 2>&1 & echo $!; wait", 300),
    )
    .await
    .unwrap();
    let job: u32 = resp.output.trim().parse().unwrap();
    assert!(alive(job));

    let out = force_terminate(&m, terminate(&resp.session_id)).await.unwrap();
    assert_eq!(out.state, SessionState::Terminated);
    assert!(out.warning.is_none());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!alive(job));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn long_wait_does_not_block_other_calls() {
    let m = Arc::new(manager());

    let slow = {
        let m = m.clone();
        tokio::spawn(async move { exec(&m, run("sleep 2", 3000)).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    let quick = tokio::time::timeout(Duration::from_millis(1500), async {
        let listed = list_sessions(&m);
        assert_eq!(listed.count, 1);
        assert_eq!(listed.sessions[0].state, SessionState::Running);
        exec(&m, run("echo hi", 1000)).await.unwrap()
    })
    .await
    .expect("other calls were blocked by a pending execute_command");
    assert_eq!(quick.state, SessionState::Completed);
    assert_eq!(quick.output, "hi\n");
    assert_eq!(read(&m, &quick.session_id).state, SessionState::Completed);
    assert!(started.elapsed() < Duration::from_millis(1500));

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.state, SessionState::Completed);
    assert_eq!(list_sessions(&m).count, 2);
}
