use serde::{Deserialize, Serialize};

/// `[observability]`: optional OTLP export alongside the JSON logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// OTLP/gRPC collector, e.g. `http://localhost:4317`.  Unset disables export.
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
    /// Fraction of traces kept, `0.0..=1.0`.
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: "deskcmd".into(),
            sample_rate: 1.0,
        }
    }
}
