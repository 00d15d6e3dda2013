// src/client/reexec.rs

//! Isolated runs of the [`CommandClient`](super::CommandClient) in a fresh
//! copy of this binary.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::agent::ChildLauncher;
use crate::cli::LogLevel;

use super::CommandArgs;

/// Starts `<exe> --child-run --config <path>` for each isolated run.
///
/// The child loads the same config file and inherits stdout, stderr and the
/// environment, so it logs the way the parent does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReexecLauncher {
    exe: PathBuf,
    config: PathBuf,
    log_level: Option<LogLevel>,
}

impl ReexecLauncher {
    pub fn new(exe: impl Into<PathBuf>, config: impl Into<PathBuf>) -> Self {
        Self {
            exe: exe.into(),
            config: config.into(),
            log_level: None,
        }
    }

    /// A launcher for the running executable.
    pub fn current(config: impl Into<PathBuf>) -> std::io::Result<Self> {
        Ok(Self::new(std::env::current_exe()?, config))
    }

    pub fn with_log_level(mut self, level: Option<LogLevel>) -> Self {
        self.log_level = level;
        self
    }

    fn args(&self, run: &CommandArgs) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("--child-run"),
            OsString::from("--config"),
            OsString::from(&self.config),
        ];
        if let Some(level) = self.log_level {
            args.push(OsString::from("--log-level"));
            args.push(OsString::from(level.as_str()));
        }
        if let Some(job_id) = &run.job_id {
            args.push(OsString::from("--job-id"));
            args.push(OsString::from(job_id));
        }
        args
    }
}

impl ChildLauncher<CommandArgs> for ReexecLauncher {
    fn command(&self, args: &CommandArgs) -> Command {
        let mut cmd = Command::new(&self.exe);
        cmd.args(self.args(args)).stdin(Stdio::null());
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::CliArgs;
    use clap::Parser;

    #[test]
    fn child_command_line_parses_as_a_child_run() {
        let launcher = ReexecLauncher::new("/usr/sbin/nodeagent", "/etc/nodeagent.toml")
            .with_log_level(Some(LogLevel::Debug));
        let run = CommandArgs {
            job_id: Some("42".to_string()),
        };

        let mut argv = vec![OsString::from("nodeagent")];
        argv.extend(launcher.args(&run));
        let parsed = CliArgs::try_parse_from(argv).unwrap();

        assert!(parsed.child_run);
        assert!(!parsed.onetime);
        assert_eq!(parsed.config, Some(PathBuf::from("/etc/nodeagent.toml")));
        assert_eq!(parsed.job_id.as_deref(), Some("42"));
        assert_eq!(parsed.log_level.map(LogLevel::as_str), Some("debug"));
    }

    #[test]
    fn command_targets_the_configured_executable() {
        let launcher = ReexecLauncher::new("/usr/sbin/nodeagent", "agent.toml");
        let cmd = launcher.command(&CommandArgs::default());
        assert_eq!(cmd.as_std().get_program(), "/usr/sbin/nodeagent");
        assert_eq!(cmd.as_std().get_args().count(), 3);
    }
}
