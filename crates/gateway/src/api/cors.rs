//! CORS from `[server.cors]`.
//!
//! Entries are exact origins (`https://ops.example.com`), port wildcards
//! (`http://localhost:*`), or a lone `"*"` for any origin.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use dc_domain::config::CorsConfig;

pub fn layer(cors: &CorsConfig) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if cors.allowed_origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS configured with wildcard \"*\"; all origins allowed");
        return base.allow_origin(Any);
    }

    let patterns = cors.allowed_origins.clone();
    base.allow_origin(AllowOrigin::predicate(move |origin: &HeaderValue, _| {
        origin
            .to_str()
            .map(|o| origin_allowed(&patterns, o))
            .unwrap_or(false)
    }))
}

/// Whether `origin` matches one of `patterns`.
pub fn origin_allowed(patterns: &[String], origin: &str) -> bool {
    patterns.iter().any(|p| match p.strip_suffix('*') {
        Some(prefix) if prefix.ends_with(':') => origin
            .strip_prefix(prefix)
            .is_some_and(|port| !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit())),
        _ => p == origin,
    })
}
