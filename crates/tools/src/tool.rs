//! Tool surface: definitions and a single dispatch entry point.
//!
//! Every call goes through [`invoke`], which deserializes the closed
//! request type for the named tool, runs it, and folds the outcome into a
//! [`ToolResult`].  Nothing here returns `Err`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use dc_domain::tool::{ToolDefinition, ToolResult};

use crate::directory::{self, KillRequest, ProcessList};
use crate::error::{Result, ToolError};
use crate::exec::{self, ExecRequest};
use crate::manager::ProcessManager;
use crate::process::{self, ForceTerminateRequest, PruneRequest, ReadOutputRequest};

pub const EXECUTE_COMMAND: &str = "execute_command";
pub const READ_OUTPUT: &str = "read_output";
pub const FORCE_TERMINATE: &str = "force_terminate";
pub const LIST_SESSIONS: &str = "list_sessions";
pub const LIST_PROCESSES: &str = "list_processes";
pub const KILL_PROCESS: &str = "kill_process";
pub const PRUNE_SESSIONS: &str = "prune_sessions";

/// Definitions for every tool this crate serves.
pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: EXECUTE_COMMAND.into(),
            description: "Run a shell command. Returns its output if it finishes within timeout_ms, \
                          otherwise the output so far and a session id to poll."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "command": { "type": "string", "description": "Command line passed to the shell" },
                    "shell": { "type": "string", "description": "Shell executable (defaults to the configured shell)" },
                    "timeout_ms": { "type": "integer", "minimum": 0, "description": "Milliseconds to wait before returning a running session" }
                },
                "required": ["command"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: READ_OUTPUT.into(),
            description: "Return output a session produced since the last read, plus its state.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "session_id": { "type": "string" },
                    "reader": { "type": "string", "description": "Independent cursor name" },
                    "include_chunks": { "type": "boolean", "description": "Also return stream-tagged chunks" }
                },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: FORCE_TERMINATE.into(),
            description: "Terminate a session's process tree (SIGTERM, then SIGKILL).".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "session_id": { "type": "string" } },
                "required": ["session_id"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: LIST_SESSIONS.into(),
            description: "List every command session, oldest first.".into(),
            parameters: empty_schema(),
        },
        ToolDefinition {
            name: LIST_PROCESSES.into(),
            description: "Snapshot all OS processes with cpu and memory usage.".into(),
            parameters: empty_schema(),
        },
        ToolDefinition {
            name: KILL_PROCESS.into(),
            description: "Forcefully kill a single process by pid.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "pid": { "type": "integer", "minimum": 1 } },
                "required": ["pid"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: PRUNE_SESSIONS.into(),
            description: "Forget finished sessions (one, or all of them).".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "session_id": { "type": "string" } },
                "additionalProperties": false
            }),
        },
    ]
}

fn empty_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {}, "additionalProperties": false })
}

/// Run `tool` with JSON `args`.  Errors come back in-band.
pub async fn invoke(manager: &ProcessManager, tool: &str, args: Value) -> ToolResult {
    let args = if args.is_null() {
        Value::Object(Default::default())
    } else {
        args
    };

    let outcome = match tool {
        EXECUTE_COMMAND => match parse::<ExecRequest>(tool, args) {
            Ok(req) => render(exec::exec(manager, req).await),
            Err(e) => Err(e),
        },
        READ_OUTPUT => parse::<ReadOutputRequest>(tool, args)
            .and_then(|req| render(process::read_output(manager, req))),
        FORCE_TERMINATE => match parse::<ForceTerminateRequest>(tool, args) {
            Ok(req) => render(process::force_terminate(manager, req).await),
            Err(e) => Err(e),
        },
        LIST_SESSIONS => parse::<NoArgs>(tool, args)
            .and_then(|_| render(Ok(process::list_sessions(manager)))),
        LIST_PROCESSES => match parse::<NoArgs>(tool, args) {
            Ok(_) => render(directory::list_processes().await.map(|processes| ProcessList {
                count: processes.len(),
                processes,
            })),
            Err(e) => Err(e),
        },
        KILL_PROCESS => match parse::<KillRequest>(tool, args) {
            Ok(req) => render(directory::kill_process(req.pid).await),
            Err(e) => Err(e),
        },
        PRUNE_SESSIONS => parse::<PruneRequest>(tool, args)
            .and_then(|req| render(process::prune_sessions(manager, req))),
        other => {
            return ToolResult::error(
                format!("unknown tool: {other}"),
                Some(serde_json::json!({ "error": "unknown_tool", "tool": other })),
            )
        }
    };

    match outcome {
        Ok((text, structured)) => ToolResult::ok(text, Some(structured)),
        Err(e) => {
            tracing::debug!(tool, kind = e.kind(), error = %e, "tool call failed");
            ToolResult::error(
                e.to_string(),
                Some(serde_json::json!({ "error": e.kind(), "message": e.to_string() })),
            )
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct NoArgs {}

fn parse<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T> {
    serde_json::from_value(args)
        .map_err(|e| ToolError::InvalidArgument(format!("invalid {tool} arguments: {e}")))
}

fn render<T: Serialize>(result: Result<T>) -> Result<(String, Value)> {
    let value = result.and_then(|resp| {
        serde_json::to_value(resp).map_err(|e| ToolError::InvalidArgument(e.to_string()))
    })?;
    let text = serde_json::to_string_pretty(&value).unwrap_or_default();
    Ok((text, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use dc_domain::config::ToolsConfig;

    fn manager() -> ProcessManager {
        ProcessManager::new(ToolsConfig::default()).unwrap()
    }

    #[test]
    fn every_tool_has_an_object_schema() {
        let defs = definitions();
        assert_eq!(defs.len(), 7);
        for d in &defs {
            assert_eq!(d.parameters["type"], "object", "{}", d.name);
        }
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_envelope() {
        let r = invoke(&manager(), "format_disk", Value::Null).await;
        assert!(r.is_error);
        assert!(r.text().contains("format_disk"));
    }

    #[tokio::test]
    async fn null_args_are_an_empty_object() {
        let r = invoke(&manager(), LIST_SESSIONS, Value::Null).await;
        assert!(!r.is_error);
        assert_eq!(r.structured.unwrap()["count"], 0);
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid_argument() {
        let m = manager();
        let r = invoke(&m, EXECUTE_COMMAND, serde_json::json!({ "command": "ls", "timeout_ms": -5 })).await;
        assert!(r.is_error);
        assert_eq!(r.structured.unwrap()["error"], "invalid_argument");

        let r = invoke(&m, LIST_SESSIONS, serde_json::json!({ "verbose": true })).await;
        assert!(r.is_error);
        assert!(m.is_empty());
    }

    #[tokio::test]
    async fn missing_session_names_the_id() {
        let r = invoke(&manager(), READ_OUTPUT, serde_json::json!({ "session_id": "abc-123" })).await;
        assert!(r.is_error);
        assert!(r.text().contains("abc-123"));
        assert_eq!(r.structured.unwrap()["error"], "session_not_found");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn execute_then_list() {
        let m = manager();
        let r = invoke(
            &m,
            EXECUTE_COMMAND,
            serde_json::json!({ "command": "echo via-envelope", "timeout_ms": 5000 }),
        )
        .await;
        assert!(!r.is_error, "{}", r.text());
        let body = r.structured.unwrap();
        assert_eq!(body["state"], "completed");
        assert!(body["output"].as_str().unwrap().contains("via-envelope"));

        let list = invoke(&m, LIST_SESSIONS, serde_json::json!({})).await;
        assert_eq!(list.structured.unwrap()["sessions"][0]["id"], body["session_id"]);
    }
}
