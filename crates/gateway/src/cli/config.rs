use std::fmt::Write as _;

use ag_domain::config::{Config, ConfigError, ConfigSeverity};

/// Print the validation report for `config validate`.
///
/// Returns `false` when any issue would stop `serve` from working.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();
    print!("{}", render_report(config, config_path, &issues));
    !issues.iter().any(|i| i.severity == ConfigSeverity::Error)
}

/// What the gateway would run with, followed by issues grouped per
/// top-level section (`server`, `upstream`, `agent`, `mcp`).
fn render_report(config: &Config, config_path: &str, issues: &[ConfigError]) -> String {
    let mut out = String::new();
    let enabled: Vec<&str> = config
        .mcp
        .enabled_servers()
        .map(|s| s.name.as_str())
        .collect();

    let _ = writeln!(out, "{config_path}");
    let _ = writeln!(
        out,
        "  serving '{}' on {}:{}",
        config.public_model_id, config.server.host, config.server.port
    );
    let _ = writeln!(
        out,
        "  upstream {} ({})",
        config.upstream.base_url, config.upstream.model
    );
    let _ = writeln!(
        out,
        "  agent: max_steps={} timeout={}ms tool_output<={}B repeat_limit={}",
        config.agent.max_steps,
        config.agent.request_timeout_ms,
        config.agent.max_tool_output_bytes,
        config.agent.repeat_limit()
    );
    if enabled.is_empty() {
        let _ = writeln!(out, "  tool servers: none enabled");
    } else {
        let _ = writeln!(out, "  tool servers: {}", enabled.join(", "));
    }

    let mut sections: Vec<&str> = Vec::new();
    for issue in issues {
        let section = issue.field.split(['.', '[']).next().unwrap_or_default();
        if !sections.contains(&section) {
            sections.push(section);
        }
    }
    for section in sections {
        let _ = writeln!(out, "\n{section}:");
        for issue in issues
            .iter()
            .filter(|i| i.field.split(['.', '[']).next() == Some(section))
        {
            let _ = writeln!(out, "  {issue}");
        }
    }

    let blocking = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .count();
    let advisory = issues.len() - blocking;
    let _ = match (blocking, advisory) {
        (0, 0) => writeln!(out, "\nready to serve"),
        (0, n) => writeln!(out, "\nready to serve with {n} warning(s)"),
        (b, n) => writeln!(out, "\nnot servable: {b} error(s), {n} warning(s)"),
    };
    out
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) -> anyhow::Result<()> {
    let output = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("failed to serialize config: {e}"))?;
    print!("{output}");
    Ok(())
}
