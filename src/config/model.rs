// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Raw configuration as read from a TOML file.
///
/// ```toml
/// [agent]
/// runinterval = "30m"
/// splay = true
/// splaylimit = "5m"
/// fork = true
/// lockfile = "/var/run/nodeagent/agent_catalog_run.lock"
/// disabled_lockfile = "/var/run/nodeagent/agent_disabled.lock"
/// filetimeout = "15s"
///
/// [client]
/// name = "apply"
/// cmd = "echo applying"
/// ```
///
/// Durations stay as strings here; [`ConfigFile`] carries the parsed values.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Run-control settings from `[agent]`.
    #[serde(default)]
    pub agent: RawAgentSection,

    /// The client the agent runs, from `[client]`.
    pub client: ClientSection,
}

/// `[agent]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAgentSection {
    /// How often the client runs.
    #[serde(default = "default_runinterval")]
    pub runinterval: String,

    /// Whether to sleep a random amount before the first run.
    #[serde(default)]
    pub splay: bool,

    /// Upper bound of the splay delay; defaults to `runinterval`.
    #[serde(default)]
    pub splaylimit: Option<String>,

    /// Run each client run in a separate child process.
    #[serde(default = "default_fork")]
    pub fork: bool,

    /// Path of the run lock shared by every agent process on this node.
    #[serde(default = "default_lockfile")]
    pub lockfile: PathBuf,

    /// Path of the administrative disable lock.
    #[serde(default = "default_disabled_lockfile")]
    pub disabled_lockfile: PathBuf,

    /// How often the config file is checked for changes; `"0s"` disables.
    #[serde(default = "default_filetimeout")]
    pub filetimeout: String,
}

fn default_runinterval() -> String {
    "30m".to_string()
}

fn default_fork() -> bool {
    true
}

fn default_lockfile() -> PathBuf {
    PathBuf::from("/var/run/nodeagent/agent_catalog_run.lock")
}

fn default_disabled_lockfile() -> PathBuf {
    PathBuf::from("/var/run/nodeagent/agent_disabled.lock")
}

fn default_filetimeout() -> String {
    "15s".to_string()
}

impl Default for RawAgentSection {
    fn default() -> Self {
        Self {
            runinterval: default_runinterval(),
            splay: false,
            splaylimit: None,
            fork: default_fork(),
            lockfile: default_lockfile(),
            disabled_lockfile: default_disabled_lockfile(),
            filetimeout: default_filetimeout(),
        }
    }
}

/// `[client]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSection {
    /// Client kind name, used in log output.
    #[serde(default = "default_client_name")]
    pub name: String,

    /// Shell command executed on every run.
    pub cmd: String,
}

fn default_client_name() -> String {
    "apply".to_string()
}

/// Validated configuration, built from [`RawConfigFile`] via `TryFrom`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub agent: AgentSettings,
    pub client: ClientSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(agent: AgentSettings, client: ClientSection) -> Self {
        Self { agent, client }
    }
}

/// Parsed `[agent]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub runinterval: Duration,
    pub splay: bool,
    pub splaylimit: Duration,
    pub fork: bool,
    pub lockfile: PathBuf,
    pub disabled_lockfile: PathBuf,
    pub filetimeout: Duration,
}
