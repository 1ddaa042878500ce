pub mod config;
pub mod tools;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use regex::Regex;
use serde_json::Value;

use ag_domain::config::Config;

/// agentgate: an OpenAI-compatible gateway that answers with MCP tools.
#[derive(Debug, Parser)]
#[command(name = "agentgate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the gateway server (default when no subcommand is given).
    Serve,
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Connect to every enabled MCP server and print the tools the agent may use.
    Tools,
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

/// Load the configuration from the path specified by `AG_CONFIG` (or
/// `config.toml` by default). Returns the parsed [`Config`] and the path
/// that was used. A missing file yields the defaults.
///
/// `PORT`, when set, overrides `server.port`.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    let config_path = std::env::var("AG_CONFIG").unwrap_or_else(|_| "config.toml".into());

    let mut config = if Path::new(&config_path).exists() {
        load_config_from(Path::new(&config_path))?
    } else {
        Config::default()
    };

    if let Ok(port) = std::env::var("PORT") {
        config.server.port = port
            .trim()
            .parse()
            .with_context(|| format!("invalid PORT value {port:?}"))?;
    }

    Ok((config, config_path))
}

/// Parse a TOML or YAML (by extension) config file, substituting
/// `{env:NAME}` placeholders from the process environment.
pub fn load_config_from(path: &Path) -> anyhow::Result<Config> {
    let display = path.display();
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {display}"))?;

    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    );
    let tree: Value = if is_yaml {
        serde_yaml::from_str(&raw).with_context(|| format!("parsing {display}"))?
    } else {
        let parsed: toml::Value =
            toml::from_str(&raw).with_context(|| format!("parsing {display}"))?;
        serde_json::to_value(parsed).with_context(|| format!("parsing {display}"))?
    };

    let tree = substitute_env(tree, &|name| std::env::var(name).ok())?;
    serde_json::from_value(tree).with_context(|| format!("invalid config in {display}"))
}

/// Replace `{env:NAME}` in every string of `value`. Unset variables become
/// empty strings.
pub fn substitute_env(
    value: Value,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> anyhow::Result<Value> {
    let pattern = Regex::new(r"\{env:([A-Z0-9_]+)\}").context("compiling env placeholder pattern")?;
    Ok(substitute(value, &pattern, lookup))
}

fn substitute(value: Value, pattern: &Regex, lookup: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(s) => Value::String(
            pattern
                .replace_all(&s, |caps: &regex::Captures<'_>| lookup(&caps[1]).unwrap_or_default())
                .into_owned(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute(v, pattern, lookup))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute(v, pattern, lookup)))
                .collect(),
        ),
        other => other,
    }
}
