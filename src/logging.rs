// src/logging.rs

//! Logging setup for `nodeagent` using `tracing` + `tracing-subscriber`.
//!
//! The filter comes from, in order: the `--log-level` flag, the
//! `NODEAGENT_LOG` environment variable (any `EnvFilter` directive string,
//! e.g. `"debug"` or `"nodeagent::agent=trace,info"`), then `info`.
//!
//! Logs go to STDERR; the client command's own output is relayed through
//! them too.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

use crate::cli::LogLevel;

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "NODEAGENT_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("could not install log subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env_value: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }

    env_value
        .map(normalize_directives)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Accept the syslog-style names operators tend to type.
fn normalize_directives(raw: &str) -> String {
    raw.split(',')
        .map(|directive| {
            let directive = directive.trim();
            let (target, level) = match directive.rsplit_once('=') {
                Some((target, level)) => (Some(target), level),
                None => (None, directive),
            };
            let level = match level.to_ascii_lowercase().as_str() {
                "notice" => "info".to_string(),
                "warning" => "warn".to_string(),
                "err" | "crit" | "alert" | "emerg" => "error".to_string(),
                other => other.to_string(),
            };
            match target {
                Some(target) => format!("{target}={level}"),
                None => level,
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    #[test]
    fn syslog_names_map_to_tracing_levels() {
        assert_eq!(normalize_directives("notice"), "info");
        assert_eq!(normalize_directives(" WARNING "), "warn");
        assert_eq!(
            normalize_directives("nodeagent::agent=notice,crit"),
            "nodeagent::agent=info,error"
        );
    }

    #[test]
    fn cli_level_wins_over_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn unusable_environment_falls_back_to_info() {
        let hint = |env| build_filter(None, env).max_level_hint();
        assert_eq!(hint(Some("nodeagent=loud")), Some(LevelFilter::INFO));
        assert_eq!(hint(None), Some(LevelFilter::INFO));
        assert_eq!(hint(Some("trace")), Some(LevelFilter::TRACE));
    }
}
