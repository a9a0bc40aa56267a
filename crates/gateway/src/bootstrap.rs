//! AppState construction, background tasks, and shutdown cleanup.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use dc_domain::config::{Config, ConfigSeverity};
use dc_tools::process::{self, ForceTerminateRequest};
use dc_tools::ProcessManager;

use crate::state::AppState;

/// Validate config and return a fully-wired [`AppState`].
pub fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Session registry ─────────────────────────────────────────────
    let processes = Arc::new(
        ProcessManager::new(config.tools.clone()).context("compiling exec_security.denied_patterns")?,
    );
    tracing::info!(
        shell = %config.tools.exec.default_shell,
        default_timeout_ms = config.tools.exec.default_timeout_ms,
        denied_patterns = config.tools.exec_security.denied_patterns.len(),
        "process manager ready"
    );

    Ok(AppState { config, processes })
}

/// Spawn the periodic sweeper that forgets long-finished sessions.
pub fn spawn_background_tasks(state: &AppState) -> tokio::task::JoinHandle<()> {
    let processes = state.processes.clone();
    let every = Duration::from_secs(state.config.tools.exec.sweep_interval_sec.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = processes.cleanup_stale();
            if removed > 0 {
                tracing::info!(removed, "pruned stale sessions");
            }
        }
    })
}

/// Force-terminate every session that is still running.
///
/// Sessions are terminated concurrently; returns how many were asked to stop.
pub async fn terminate_running(processes: &Arc<ProcessManager>) -> usize {
    let ids = processes.running_ids();
    let count = ids.len();
    let mut tasks = Vec::with_capacity(count);
    for session_id in ids {
        let processes = processes.clone();
        tasks.push(tokio::spawn(async move {
            let req = ForceTerminateRequest {
                session_id: session_id.clone(),
            };
            if let Err(e) = process::force_terminate(&processes, req).await {
                tracing::warn!(session_id = %session_id, error = %e, "terminate on shutdown failed");
            }
        }));
    }
    for task in tasks {
        let _ = task.await;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_is_refused() {
        let mut config = Config::default();
        config.server.port = 0;
        assert!(build_app_state(Arc::new(config)).is_err());
    }

    #[test]
    fn default_config_builds() {
        let state = build_app_state(Arc::new(Config::default())).unwrap();
        assert!(state.processes.is_empty());
    }

    #[tokio::test]
    async fn nothing_to_terminate() {
        let state = build_app_state(Arc::new(Config::default())).unwrap();
        assert_eq!(terminate_running(&state.processes).await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn running_sessions_are_stopped() {
        let state = build_app_state(Arc::new(Config::default())).unwrap();
        let req = dc_tools::exec::ExecRequest {
            command: "sleep 30".into(),
            shell: None,
            timeout_ms: Some(50),
        };
        let resp = dc_tools::exec::exec(&state.processes, req).await.unwrap();
        assert_eq!(terminate_running(&state.processes).await, 1);
        let slot = state.processes.get(&resp.session_id).unwrap();
        assert_eq!(slot.state(), dc_tools::manager::SessionState::Terminated);
    }
}
