//! Tools API endpoints.
//!
//! - `GET  /v1/tools`         tool definitions with parameter schemas
//! - `POST /v1/tools/invoke`  `{tool, args}` dispatch
//! - `POST /v1/tools/:tool`   same, tool name taken from the path
//!
//! Tool failures are reported in the result envelope, never as HTTP
//! errors: every dispatched call answers 200.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use dc_domain::tool::{ToolCall, ToolResult};
use dc_tools::tool;

use crate::state::AppState;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GET /v1/tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn list_tools() -> impl IntoResponse {
    let tools = tool::definitions();
    Json(serde_json::json!({
        "count": tools.len(),
        "tools": tools,
    }))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tools/invoke
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub async fn invoke_tool(
    State(state): State<AppState>,
    Json(call): Json<ToolCall>,
) -> Json<ToolResult> {
    Json(dispatch(&state, &call.tool, call.args).await)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// POST /v1/tools/:tool
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The body is the tool's argument object; an empty body means no arguments.
pub async fn invoke_named(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: axum::body::Bytes,
) -> Json<ToolResult> {
    let args = if body.is_empty() {
        serde_json::Value::Null
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => {
                return Json(ToolResult::error(
                    format!("request body is not valid JSON: {e}"),
                    Some(serde_json::json!({ "error": "invalid_argument" })),
                ))
            }
        }
    };
    Json(dispatch(&state, &name, args).await)
}

async fn dispatch(state: &AppState, name: &str, args: serde_json::Value) -> ToolResult {
    let start = std::time::Instant::now();
    let result = tool::invoke(&state.processes, name, args).await;
    tracing::debug!(
        tool = %name,
        is_error = result.is_error,
        duration_ms = start.elapsed().as_millis() as u64,
        "tool invoked"
    );
    result
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use dc_domain::config::Config;

    use crate::bootstrap::build_app_state;

    fn app() -> axum::Router {
        let state = build_app_state(Arc::new(Config::default())).unwrap();
        crate::api::router().with_state(state)
    }

    async fn post(uri: &str, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let req = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let resp = app().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn lists_seven_tools() {
        let req = Request::get("/v1/tools").body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["count"], 7);
    }

    #[tokio::test]
    async fn tool_errors_are_still_200() {
        let (status, body) = post(
            "/v1/tools/invoke",
            serde_json::json!({ "tool": "read_output", "args": { "session_id": "missing" } }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_error"], true);
        assert_eq!(body["structured"]["error"], "session_not_found");
    }

    #[tokio::test]
    async fn path_form_with_empty_args() {
        let (status, body) = post("/v1/tools/list_sessions", serde_json::json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_error"], false);
        assert_eq!(body["structured"]["count"], 0);
    }

    #[tokio::test]
    async fn unknown_tool_in_path() {
        let (_, body) = post("/v1/tools/reboot", serde_json::json!({})).await;
        assert_eq!(body["is_error"], true);
    }

    #[tokio::test]
    async fn health_reports_session_count() {
        let req = Request::get("/health").body(Body::empty()).unwrap();
        let resp = app().oneshot(req).await.unwrap();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["sessions"], 0);
    }
}
