use std::sync::Arc;

use dc_domain::config::Config;
use dc_tools::ProcessManager;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Session registry behind every command tool.
    pub processes: Arc<ProcessManager>,
}
