use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 3220;

/// `[server]`: where the HTTP surface listens and how it protects itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// In-flight request ceiling; further requests queue.
    pub max_concurrent_requests: usize,
    pub cors: CorsConfig,
    /// Per-IP token bucket.  Absent means no rate limiting.
    pub rate_limit: Option<RateLimitConfig>,
    /// Locked PID file; a second instance with the same path refuses to start.
    pub pid_file: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: DEFAULT_PORT,
            max_concurrent_requests: 256,
            cors: CorsConfig::default(),
            rate_limit: None,
            pid_file: None,
        }
    }
}

impl ServerConfig {
    /// `host:port`, bracketing bare IPv6 hosts.
    pub fn bind_addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u64,
    pub burst_size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origins, `scheme://host:*` port wildcards, or `["*"]`.
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:*".into(), "http://127.0.0.1:*".into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_is_all_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.max_concurrent_requests, 256);
        assert!(cfg.rate_limit.is_none());
        assert_eq!(cfg.cors.allowed_origins.len(), 2);
    }

    #[test]
    fn rate_limit_table() {
        let cfg: ServerConfig = toml::from_str(
            "port = 8080\n[rate_limit]\nrequests_per_second = 5\nburst_size = 20\n",
        )
        .unwrap();
        assert_eq!(cfg.port, 8080);
        let rl = cfg.rate_limit.unwrap();
        assert_eq!((rl.requests_per_second, rl.burst_size), (5, 20));
    }

    #[test]
    fn bind_addr_handles_ipv6() {
        let mut cfg = ServerConfig::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:3220");
        cfg.host = "::1".into();
        assert_eq!(cfg.bind_addr(), "[::1]:3220");
    }
}
