#![allow(dead_code)]

use std::path::Path;

use nodeagent::config::{ClientSection, ConfigFile, RawAgentSection, RawConfigFile};

/// Builder for `ConfigFile` to simplify test setup.
///
/// Lock files default to paths under `dir`, so every test gets its own.
pub struct AgentConfigBuilder {
    config: RawConfigFile,
}

impl AgentConfigBuilder {
    pub fn new(dir: &Path) -> Self {
        Self {
            config: RawConfigFile {
                agent: RawAgentSection {
                    runinterval: "30m".to_string(),
                    fork: false,
                    lockfile: dir.join("agent_catalog_run.lock"),
                    disabled_lockfile: dir.join("agent_disabled.lock"),
                    ..RawAgentSection::default()
                },
                client: ClientSection {
                    name: "apply".to_string(),
                    cmd: "true".to_string(),
                },
            },
        }
    }

    pub fn runinterval(mut self, value: &str) -> Self {
        self.config.agent.runinterval = value.to_string();
        self
    }

    pub fn splay(mut self, limit: &str) -> Self {
        self.config.agent.splay = true;
        self.config.agent.splaylimit = Some(limit.to_string());
        self
    }

    pub fn fork(mut self, fork: bool) -> Self {
        self.config.agent.fork = fork;
        self
    }

    pub fn filetimeout(mut self, value: &str) -> Self {
        self.config.agent.filetimeout = value.to_string();
        self
    }

    pub fn client(mut self, name: &str, cmd: &str) -> Self {
        self.config.client = ClientSection {
            name: name.to_string(),
            cmd: cmd.to_string(),
        };
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}
