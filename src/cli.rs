// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

/// Command-line arguments for `nodeagent`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "nodeagent",
    version,
    about = "Periodically run a configuration client under a run lock.",
    long_about = None,
    group(ArgGroup::new("single_run").args(["onetime", "child_run"]))
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Defaults to `$NODEAGENT_CONFIG`, then `nodeagent.toml`.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Run the client once in the foreground and exit with its status.
    #[arg(long)]
    pub onetime: bool,

    /// Job identifier exported to the client command (with `--onetime`).
    #[arg(long, value_name = "ID", requires = "single_run")]
    pub job_id: Option<String>,

    /// Run the client inline instead of in a child process.
    #[arg(long)]
    pub no_fork: bool,

    /// Perform one client run as the child process of an isolated run.
    #[arg(long, hide = true)]
    pub child_run: bool,

    /// Administratively disable the agent, optionally recording a reason.
    #[arg(long, value_name = "MESSAGE", num_args = 0..=1, default_missing_value = "")]
    pub disable: Option<String>,

    /// Re-enable an administratively disabled agent.
    #[arg(long, conflicts_with = "disable")]
    pub enable: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `NODEAGENT_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate the config, print it, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
