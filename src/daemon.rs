// src/daemon.rs

//! Long-running daemon around the agent.
//!
//! Wires the agent and the config reparse job into a [`Scheduler`], maps OS
//! signals onto [`ApplicationState`], and reports how the loop ended so the
//! binary can exit or re-exec itself.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use blake3::Hasher;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::agent::{Agent, BoxFuture, ClientArgs, ClientFactory};
use crate::config::AgentSettings;
use crate::errors::Result;
use crate::schedule::{Job, Scheduler, SchedulerHandle};
use crate::state::{ApplicationState, RunStateController};

/// Drift accepted when the agent timer fires early or late.
pub const RUN_TOLERANCE: Duration = Duration::from_secs(1);

/// How the daemon loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    Stopped,
    Restart,
}

/// The repeating job that runs the agent with default arguments.
pub fn agent_job<F: ClientFactory>(agent: Arc<Agent<F>>, interval: Duration) -> Job {
    Job::new("agent", interval, move || -> BoxFuture<'static, Result<()>> {
        let agent = Arc::clone(&agent);
        Box::pin(async move {
            let outcome = agent.run(ClientArgs::<F>::default()).await?;
            debug!(?outcome, "scheduled agent run finished");
            Ok(())
        })
    })
    .with_tolerance(RUN_TOLERANCE)
    .start_immediately(true)
}

/// Detects content changes of the config file.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    last_hash: Option<String>,
}

impl ConfigWatcher {
    /// Start watching `path`, remembering its current content hash.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let last_hash = match compute_file_hash(&path) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(path = %path.display(), error = %format!("{e:#}"), "could not hash config file");
                None
            }
        };
        Self { path, last_hash }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the content differs from the last observed hash.
    ///
    /// An unreadable file is not a change; the previous hash is kept.
    pub fn changed(&mut self) -> bool {
        let hash = match compute_file_hash(&self.path) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(path = %self.path.display(), error = %format!("{e:#}"), "could not hash config file");
                return false;
            }
        };

        if self.last_hash.as_deref() == Some(hash.as_str()) {
            return false;
        }
        let first_read = self.last_hash.is_none();
        self.last_hash = Some(hash);
        !first_read
    }
}

fn compute_file_hash(path: &Path) -> anyhow::Result<String> {
    let mut hasher = Hasher::new();
    let mut file =
        File::open(path).with_context(|| format!("opening file for hashing: {:?}", path))?;
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

/// Job that requests a restart once the config file changes.
pub fn reparse_job(path: impl Into<PathBuf>, state: Arc<ApplicationState>, interval: Duration) -> Job {
    let mut watcher = ConfigWatcher::new(path);
    Job::new("reparse", interval, move || -> BoxFuture<'static, Result<()>> {
        if watcher.changed() {
            info!(path = %watcher.path().display(), "config file changed; requesting restart");
            state.request_restart();
        }
        Box::pin(async { Ok(()) })
    })
    .start_immediately(false)
}

/// Run the agent on its interval until a stop or restart is requested.
pub async fn run_daemon<F: ClientFactory>(
    agent: Arc<Agent<F>>,
    state: Arc<ApplicationState>,
    settings: &AgentSettings,
    config_path: Option<&Path>,
) -> Result<DaemonExit> {
    let mut scheduler = Scheduler::new(Arc::clone(&state) as Arc<dyn RunStateController>);
    scheduler.add_job(agent_job(Arc::clone(&agent), settings.runinterval));

    if let Some(path) = config_path {
        if !settings.filetimeout.is_zero() {
            scheduler.add_job(reparse_job(path, Arc::clone(&state), settings.filetimeout));
        }
    }

    let signals = spawn_signal_handlers(Arc::clone(&state), scheduler.handle(), agent)?;

    info!(
        runinterval_secs = settings.runinterval.as_secs(),
        fork = settings.fork,
        splay = settings.splay,
        "agent daemon started"
    );

    let result = scheduler.run_loop().await;
    signals.abort();
    result?;

    let exit = if state.needing_restart() {
        DaemonExit::Restart
    } else {
        DaemonExit::Stopped
    };
    info!(?exit, "agent daemon finished");
    Ok(exit)
}

/// SIGTERM stops, SIGINT interrupts and stops the active client, SIGHUP
/// restarts, SIGUSR1 runs the agent now.
#[cfg(unix)]
fn spawn_signal_handlers<F: ClientFactory>(
    state: Arc<ApplicationState>,
    handle: SchedulerHandle,
    agent: Arc<Agent<F>>,
) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut hup = signal(SignalKind::hangup())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                Some(()) = term.recv() => {
                    info!("caught SIGTERM; stopping");
                    state.request_stop();
                }
                Some(()) = int.recv() => {
                    info!("caught SIGINT; interrupting");
                    state.interrupt();
                    agent.stop_client();
                }
                Some(()) = hup.recv() => {
                    info!("caught SIGHUP; restarting");
                    state.request_restart();
                }
                Some(()) = usr1.recv() => {
                    info!("caught SIGUSR1; running now");
                    handle.run_now();
                    continue;
                }
                else => break,
            }
            handle.wake();
        }
    }))
}

#[cfg(not(unix))]
fn spawn_signal_handlers<F: ClientFactory>(
    state: Arc<ApplicationState>,
    handle: SchedulerHandle,
    agent: Arc<Agent<F>>,
) -> Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        state.interrupt();
        agent.stop_client();
        handle.wake();
    }))
}

/// Replace the current process with a fresh copy of itself.
///
/// Only returns on failure.
pub fn reexec() -> std::io::Error {
    let exe = match std::env::current_exe() {
        Ok(exe) => exe,
        Err(e) => return e,
    };
    info!(exe = %exe.display(), "re-executing agent");

    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        std::process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .exec()
    }
    #[cfg(not(unix))]
    {
        std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            format!("cannot re-exec {:?} on this platform", exe),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_watcher_reports_content_changes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodeagent.toml");
        std::fs::write(&path, "[client]\ncmd = \"true\"\n").unwrap();

        let mut watcher = ConfigWatcher::new(&path);
        assert!(!watcher.changed());

        std::fs::write(&path, "[client]\ncmd = \"false\"\n").unwrap();
        assert!(watcher.changed());
        assert!(!watcher.changed());
    }

    #[test]
    fn missing_config_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let mut watcher = ConfigWatcher::new(&path);
        assert!(!watcher.changed());

        std::fs::write(&path, "x").unwrap();
        assert!(!watcher.changed(), "first successful read only sets the baseline");
        std::fs::write(&path, "y").unwrap();
        assert!(watcher.changed());
    }

    #[tokio::test(start_paused = true)]
    async fn reparse_job_requests_restart_after_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nodeagent.toml");
        std::fs::write(&path, "a").unwrap();

        let state = Arc::new(ApplicationState::new());
        let mut scheduler = Scheduler::new(Arc::clone(&state) as Arc<dyn RunStateController>);
        scheduler.add_job(reparse_job(&path, Arc::clone(&state), Duration::from_secs(15)));

        std::fs::write(&path, "b").unwrap();
        scheduler.run_loop().await.unwrap();

        assert!(state.needing_restart());
    }
}
