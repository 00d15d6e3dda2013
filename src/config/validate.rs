// src/config/validate.rs

use std::time::Duration;

use crate::config::duration::parse_duration;
use crate::config::model::{AgentSettings, ConfigFile, RawAgentSection, RawConfigFile};
use crate::errors::{AgentError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AgentError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let agent = validate_agent_section(&raw.agent)?;
        if raw.client.cmd.trim().is_empty() {
            return Err(AgentError::ConfigError(
                "[client].cmd must not be empty".to_string(),
            ));
        }
        Ok(ConfigFile::new_unchecked(agent, raw.client))
    }
}

fn validate_agent_section(raw: &RawAgentSection) -> Result<AgentSettings> {
    let runinterval = duration_setting("runinterval", &raw.runinterval)?;
    if runinterval.is_zero() {
        return Err(AgentError::ConfigError(
            "[agent].runinterval must be greater than zero".to_string(),
        ));
    }

    let splaylimit = match raw.splaylimit {
        Some(ref s) => duration_setting("splaylimit", s)?,
        None => runinterval,
    };

    let filetimeout = duration_setting("filetimeout", &raw.filetimeout)?;

    if raw.lockfile == raw.disabled_lockfile {
        return Err(AgentError::ConfigError(format!(
            "[agent].lockfile and [agent].disabled_lockfile must differ (both {:?})",
            raw.lockfile
        )));
    }

    Ok(AgentSettings {
        runinterval,
        splay: raw.splay,
        splaylimit,
        fork: raw.fork,
        lockfile: raw.lockfile.clone(),
        disabled_lockfile: raw.disabled_lockfile.clone(),
        filetimeout,
    })
}

fn duration_setting(name: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| AgentError::ConfigError(format!("[agent].{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::ClientSection;

    fn raw(agent: RawAgentSection) -> RawConfigFile {
        RawConfigFile {
            agent,
            client: ClientSection {
                name: "apply".to_string(),
                cmd: "true".to_string(),
            },
        }
    }

    #[test]
    fn splaylimit_defaults_to_runinterval() {
        let cfg = ConfigFile::try_from(raw(RawAgentSection {
            runinterval: "10m".to_string(),
            ..RawAgentSection::default()
        }))
        .unwrap();

        assert_eq!(cfg.agent.runinterval, Duration::from_secs(600));
        assert_eq!(cfg.agent.splaylimit, Duration::from_secs(600));
        assert!(cfg.agent.fork);
        assert!(!cfg.agent.splay);
    }

    #[test]
    fn zero_runinterval_is_rejected() {
        let err = ConfigFile::try_from(raw(RawAgentSection {
            runinterval: "0".to_string(),
            ..RawAgentSection::default()
        }))
        .unwrap_err();

        match err {
            AgentError::ConfigError(msg) => assert!(msg.contains("runinterval")),
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn bad_duration_names_the_setting() {
        let err = ConfigFile::try_from(raw(RawAgentSection {
            splaylimit: Some("soon".to_string()),
            ..RawAgentSection::default()
        }))
        .unwrap_err();

        assert!(err.to_string().contains("splaylimit"));
    }

    #[test]
    fn lock_paths_must_differ() {
        let agent = RawAgentSection::default();
        let err = ConfigFile::try_from(raw(RawAgentSection {
            disabled_lockfile: agent.lockfile.clone(),
            ..agent
        }))
        .unwrap_err();

        assert!(matches!(err, AgentError::ConfigError(_)));
    }

    #[test]
    fn empty_command_is_rejected() {
        let mut cfg = raw(RawAgentSection::default());
        cfg.client.cmd = "   ".to_string();
        assert!(ConfigFile::try_from(cfg).is_err());
    }
}
