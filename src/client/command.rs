// src/client/command.rs

//! A client that runs a shell command.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::agent::{BoxFuture, Client, ClientFactory};
use crate::config::ConfigFile;

/// Environment variable carrying [`CommandArgs::job_id`] into the command.
pub const JOB_ID_ENV: &str = "NODEAGENT_JOB_ID";

/// Builds [`CommandClient`]s for one configured command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFactory {
    name: String,
    cmd: String,
    lockfile: PathBuf,
}

impl CommandFactory {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>, lockfile: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            lockfile: lockfile.into(),
        }
    }

    pub fn from_config(cfg: &ConfigFile) -> Self {
        Self::new(&cfg.client.name, &cfg.client.cmd, &cfg.agent.lockfile)
    }

    pub fn cmd(&self) -> &str {
        &self.cmd
    }
}

impl ClientFactory for CommandFactory {
    type Client = CommandClient;

    fn name(&self) -> &str {
        &self.name
    }

    fn lockfile_path(&self) -> PathBuf {
        self.lockfile.clone()
    }

    fn build(&self) -> Result<CommandClient> {
        Ok(CommandClient::new(&self.name, &self.cmd))
    }
}

/// Per-run arguments for [`CommandClient`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandArgs {
    /// Exported to the command as `NODEAGENT_JOB_ID`.
    pub job_id: Option<String>,
}

/// Runs `sh -c <cmd>` and reports the exit status.
///
/// `stop()` kills the running process; the run then reports no status.
#[derive(Debug)]
pub struct CommandClient {
    name: String,
    cmd: String,
    cancel: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandClient {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
            cancel: Mutex::new(None),
        }
    }

    async fn run_command(&self, args: CommandArgs) -> Result<Option<i32>> {
        info!(client = %self.name, cmd = %self.cmd, "starting client command");

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        if let Some(ref job_id) = args.job_id {
            cmd.env(JOB_ID_ENV, job_id);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning command for client '{}'", self.name))?;

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        *self.cancel.lock().unwrap_or_else(PoisonError::into_inner) = Some(cancel_tx);

        if let Some(stdout) = child.stdout.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    info!(client = %name, "{}", line);
                }
            });
        }

        if let Some(stderr) = child.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(client = %name, "stderr: {}", line);
                }
            });
        }

        let result = tokio::select! {
            status_res = child.wait() => {
                let status = status_res.with_context(|| {
                    format!("waiting for command of client '{}'", self.name)
                })?;
                let code = exit_code(&status);
                info!(client = %self.name, exit_code = code, success = status.success(), "client command exited");
                Ok(Some(code))
            }

            cancel = &mut cancel_rx => {
                if cancel.is_ok() {
                    info!(client = %self.name, "stop requested; killing client command");
                    if let Err(e) = child.kill().await {
                        warn!(client = %self.name, error = %e, "failed to kill client command");
                    }
                } else {
                    debug!(client = %self.name, "cancel channel closed without a stop request");
                }
                Ok(None)
            }
        };

        self.cancel.lock().unwrap_or_else(PoisonError::into_inner).take();
        result
    }
}

impl Client for CommandClient {
    type Args = CommandArgs;

    fn run(&self, args: CommandArgs) -> BoxFuture<'_, Result<Option<i32>>> {
        Box::pin(self.run_command(args))
    }

    fn stop(&self) {
        if let Some(cancel) = self.cancel.lock().unwrap_or_else(PoisonError::into_inner).take() {
            let _ = cancel.send(());
        }
    }
}

/// Exit code of a finished process; signal deaths map to `128 + signo`.
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            return 128 + signo;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn reports_the_exit_code() {
        let client = CommandClient::new("test", "exit 3");
        let status = client.run(CommandArgs::default()).await.unwrap();
        assert_eq!(status, Some(3));
    }

    #[tokio::test]
    async fn exports_the_job_id() {
        let client = CommandClient::new("test", "test \"$NODEAGENT_JOB_ID\" = abc123");
        let args = CommandArgs {
            job_id: Some("abc123".to_string()),
        };
        assert_eq!(client.run(args).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn stop_kills_the_running_command() {
        let client = Arc::new(CommandClient::new("test", "sleep 30"));

        let runner = Arc::clone(&client);
        let handle = tokio::spawn(async move { runner.run(CommandArgs::default()).await });

        // Wait until the run has registered its cancel channel.
        for _ in 0..100 {
            if client.cancel.lock().unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        client.stop();

        let status = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("stopped command should finish")
            .unwrap()
            .unwrap();
        assert_eq!(status, None);
    }
}
