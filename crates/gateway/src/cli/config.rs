use std::io::Write;

use dc_domain::config::{Config, ConfigSeverity};

/// Print every config issue to `out` followed by a one-line summary.
///
/// Returns `true` when no issue is an error (warnings alone still pass).
pub fn validate(config: &Config, config_path: &str, out: &mut impl Write) -> anyhow::Result<bool> {
    let issues = config.validate();
    if issues.is_empty() {
        writeln!(out, "Config OK ({config_path})")?;
        return Ok(true);
    }

    let (errors, warnings): (Vec<_>, Vec<_>) = issues
        .iter()
        .partition(|i| i.severity == ConfigSeverity::Error);
    for issue in errors.iter().chain(&warnings) {
        writeln!(out, "{issue}")?;
    }
    writeln!(
        out,
        "\n{} error(s), {} warning(s) in {config_path}",
        errors.len(),
        warnings.len()
    )?;
    Ok(errors.is_empty())
}

/// Render the resolved config (defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<String> {
    toml::to_string_pretty(config).map_err(|e| anyhow::anyhow!("serializing config: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let mut out = Vec::new();
        assert!(validate(&Config::default(), "config.toml", &mut out).unwrap());
        assert!(String::from_utf8(out).unwrap().starts_with("Config OK"));
    }

    #[test]
    fn errors_fail_validation_but_warnings_do_not() {
        let mut config = Config::default();
        config.tools.exec.max_output_bytes = 10;
        assert!(validate(&config, "c.toml", &mut Vec::new()).unwrap());

        config.tools.exec.default_shell = String::new();
        let mut out = Vec::new();
        assert!(!validate(&config, "c.toml", &mut out).unwrap());
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("tools.exec.default_shell"));
        assert!(text.contains("1 error(s), 1 warning(s)"));
    }

    #[test]
    fn show_round_trips() {
        let rendered = show(&Config::default()).unwrap();
        let parsed = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed.server.port, Config::default().server.port);
    }
}
