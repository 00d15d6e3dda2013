// src/agent/isolation.rs

//! Running one unit of work in a separate child process.
//!
//! The parent builds a command through a [`ChildLauncher`], spawns it and
//! waits, turning the exit status into a [`ChildOutcome`]. The child is a
//! fresh process (normally this binary re-executed with `--child-run`), so it
//! shares no locks, threads or log sinks with the parent. It performs the
//! work through [`Agent::run_as_child`](super::Agent::run_as_child) and exits
//! with a code derived from the outcome. Two codes are reserved:
//!
//! - `-1` ([`ABORT_EXIT_CODE`]): the child aborted; the parent must too.
//! - `-2` ([`OUT_OF_MEMORY_EXIT_CODE`]): the child ran out of memory.
//!
//! Exit statuses are 8 bits wide on Unix, so these travel as 255 and 254.

use std::process::ExitStatus;

use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::errors::{ABORT_EXIT_CODE, AgentError, OUT_OF_MEMORY_EXIT_CODE, Result};

/// Builds the command that performs one isolated run with the given args.
pub trait ChildLauncher<A>: Send + Sync + 'static {
    fn command(&self, args: &A) -> Command;
}

/// How a child process terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildOutcome {
    /// Normal exit, with the sentinel statuses already decoded.
    Exited(i32),
    /// Terminated by a signal.
    Killed(FatalSignal),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalSignal {
    /// SIGQUIT or SIGABRT.
    Quit,
    /// SIGKILL, which is what the kernel OOM killer sends.
    OutOfMemory,
    Other(i32),
}

impl FatalSignal {
    pub fn from_signal(signo: i32) -> Self {
        #[cfg(unix)]
        {
            match signo {
                libc::SIGQUIT | libc::SIGABRT => FatalSignal::Quit,
                libc::SIGKILL => FatalSignal::OutOfMemory,
                other => FatalSignal::Other(other),
            }
        }
        #[cfg(not(unix))]
        {
            FatalSignal::Other(signo)
        }
    }
}

impl ChildOutcome {
    /// Decode a raw 8-bit exit status.
    pub fn from_exit_status(status: i32) -> Self {
        match status {
            255 => ChildOutcome::Exited(ABORT_EXIT_CODE),
            254 => ChildOutcome::Exited(OUT_OF_MEMORY_EXIT_CODE),
            other => ChildOutcome::Exited(other),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signo) = status.signal() {
                return ChildOutcome::Killed(FatalSignal::from_signal(signo));
            }
        }
        status
            .code()
            .map_or(ChildOutcome::Exited(ABORT_EXIT_CODE), ChildOutcome::from_exit_status)
    }

    /// Translate the outcome into the parent's result.
    ///
    /// Only the two sentinel conditions become errors; every other code is
    /// handed back unchanged.
    pub fn into_exit_code(self) -> Result<i32> {
        match self {
            ChildOutcome::Exited(ABORT_EXIT_CODE) | ChildOutcome::Killed(FatalSignal::Quit) => {
                Err(AgentError::ChildAborted(ABORT_EXIT_CODE))
            }
            ChildOutcome::Exited(OUT_OF_MEMORY_EXIT_CODE)
            | ChildOutcome::Killed(FatalSignal::OutOfMemory) => Err(AgentError::OutOfMemory),
            ChildOutcome::Exited(code) => Ok(code),
            ChildOutcome::Killed(FatalSignal::Other(signo)) => Ok(128 + signo),
        }
    }
}

/// Exit status a child reports for the result of its work.
pub fn child_exit_code(result: Result<Option<i32>>) -> i32 {
    match result {
        Ok(status) => status.unwrap_or(0),
        Err(AgentError::OutOfMemory) => OUT_OF_MEMORY_EXIT_CODE,
        Err(AgentError::ChildAborted(_)) => ABORT_EXIT_CODE,
        Err(_) => 1,
    }
}

/// A started child the parent has not reaped yet.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    pid: Option<u32>,
}

/// Spawn `command` as the child of one isolated run.
///
/// The child is killed if the returned handle is dropped before it exits.
pub fn spawn_child(mut command: Command) -> Result<ChildProcess> {
    let child = command
        .kill_on_drop(true)
        .spawn()
        .map_err(AgentError::SpawnFailed)?;
    let pid = child.id();
    debug!(?pid, "started child process for client run");
    Ok(ChildProcess { child, pid })
}

impl ChildProcess {
    /// Wait for the child to exit. Each notification on `stop` sends it a
    /// termination request.
    pub async fn wait(&mut self, stop: &Notify) -> Result<ChildOutcome> {
        let status = loop {
            tokio::select! {
                status = self.child.wait() => break status?,
                () = stop.notified() => self.terminate(),
            }
        };
        let outcome = ChildOutcome::from_status(status);
        debug!(pid = ?self.pid, ?outcome, "child process exited");
        Ok(outcome)
    }

    /// SIGTERM on Unix, so the child can stop its client; a hard kill
    /// elsewhere.
    fn terminate(&mut self) {
        info!(pid = ?self.pid, "asking child process to stop");
        #[cfg(unix)]
        {
            let Some(pid) = self.child.id() else {
                return;
            };
            // SAFETY: `pid` names our own unreaped child; `kill` has no
            // memory-safety preconditions.
            if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
                warn!(pid, error = %std::io::Error::last_os_error(), "could not signal child process");
            }
        }
        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                warn!(pid = ?self.pid, error = %e, "could not kill child process");
            }
        }
    }
}

/// Resolves when this process is asked to terminate.
///
/// The listener is registered on construction, so a request that arrives
/// before the first `recv` is not lost.
pub struct Termination {
    #[cfg(unix)]
    signal: Option<tokio::signal::unix::Signal>,
}

impl Termination {
    pub fn listen() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let signal = signal(SignalKind::terminate())
                .inspect_err(|e| warn!(error = %e, "could not listen for SIGTERM in child process"))
                .ok();
            Self { signal }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    pub async fn recv(&mut self) {
        #[cfg(unix)]
        {
            if let Some(signal) = self.signal.as_mut() {
                if signal.recv().await.is_some() {
                    return;
                }
            }
        }
        std::future::pending::<()>().await
    }
}

/// Report a panic as usual, then exit with [`ABORT_EXIT_CODE`].
///
/// Only for processes that exist to perform one isolated run.
pub fn exit_on_panic() {
    let report = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        report(info);
        std::process::exit(ABORT_EXIT_CODE);
    }));
}
