pub mod cors;
pub mod health;
pub mod tools;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/v1/tools", get(tools::list_tools))
        .route("/v1/tools/invoke", post(tools::invoke_tool))
        .route("/v1/tools/:tool", post(tools::invoke_named))
}
