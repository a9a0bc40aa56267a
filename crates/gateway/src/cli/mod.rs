pub mod config;
pub mod pid;

use clap::{Parser, Subcommand};

/// deskcmd: run shell commands and manage processes over HTTP.
#[derive(Debug, Parser)]
#[command(name = "deskcmd", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version information.
    Version,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Parse the config file and report any errors.
    Validate,
    /// Dump the resolved configuration (with defaults) as TOML.
    Show,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path specified by `DC_CONFIG` (or
/// `config.toml` by default).  Returns the parsed [`Config`] and the
/// path that was used.
///
/// [`Config`]: dc_domain::config::Config
pub fn load_config() -> anyhow::Result<(dc_domain::config::Config, String)> {
    let config_path = std::env::var("DC_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = dc_domain::config::Config::load(std::path::Path::new(&config_path))
        .map_err(|e| anyhow::anyhow!("loading {config_path}: {e}"))?;
    Ok((config, config_path))
}
