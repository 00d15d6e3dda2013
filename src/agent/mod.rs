// src/agent/mod.rs

//! The agent: decides whether, when and how isolated one client run executes.
//!
//! A run goes through these gates, in order:
//!
//! 1. administratively disabled? skip.
//! 2. run lock already held (by this or another process)? skip.
//! 3. take the in-process mutex, then the run lock (released on every exit
//!    path by [`RunLockGuard`](crate::lock::RunLockGuard)).
//! 4. splay, once per lifetime.
//! 5. ask the [`RunStateController`] whether the state is clear; skip if not.
//! 6. build the client and run it, inline or in an isolated child process.
//!
//! Client failures are logged and contained here. Only the fatal conditions a
//! child process relays (abort, out of memory) and lock I/O failures cross
//! this boundary.

pub mod client;
pub mod isolation;
pub mod splay;

pub use client::{BoxFuture, Client, ClientArgs, ClientFactory};
pub use isolation::{ChildLauncher, ChildOutcome, FatalSignal};
pub use splay::Splay;

use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::config::AgentSettings;
use crate::errors::{AgentError, Result, is_out_of_memory};
use crate::lock::{Disabler, RunLock};
use crate::state::{RunStateController, RunStatus};

/// What a call to [`Agent::run`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The agent is administratively disabled.
    Disabled,
    /// Another run holds the run lock.
    AlreadyRunning,
    /// A stop, restart or interrupt was pending; the client was not built.
    Skipped(RunStatus),
    /// The client ran inline. `None` when it failed or returned no status.
    Completed(Option<i32>),
    /// The client ran in a child process that exited with this code.
    ChildExited(i32),
}

impl RunOutcome {
    /// The exit status this outcome stands for, if any client ran.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            RunOutcome::Completed(status) => *status,
            RunOutcome::ChildExited(code) => Some(*code),
            _ => None,
        }
    }
}

pub struct Agent<F: ClientFactory> {
    factory: F,
    state: Arc<dyn RunStateController>,
    splay: Splay,
    should_fork: bool,
    launcher: Option<Arc<dyn ChildLauncher<ClientArgs<F>>>>,
    disabler: Option<Disabler>,
    run_lock: OnceLock<RunLock>,
    mutex: tokio::sync::Mutex<()>,
    client: Mutex<Option<Arc<F::Client>>>,
    child_stop: Mutex<Option<Arc<Notify>>>,
}

impl<F: ClientFactory> Agent<F> {
    /// A non-forking agent without splay or disable lock.
    pub fn new(factory: F, state: Arc<dyn RunStateController>) -> Self {
        Self {
            factory,
            state,
            splay: Splay::disabled(),
            should_fork: false,
            launcher: None,
            disabler: None,
            run_lock: OnceLock::new(),
            mutex: tokio::sync::Mutex::new(()),
            client: Mutex::new(None),
            child_stop: Mutex::new(None),
        }
    }

    /// An agent configured from the `[agent]` settings.
    pub fn from_settings(
        factory: F,
        state: Arc<dyn RunStateController>,
        settings: &AgentSettings,
    ) -> Self {
        Self::new(factory, state)
            .with_splay(Splay::new(settings.splay, settings.splaylimit))
            .with_fork(settings.fork)
            .with_disabler(Disabler::new(&settings.disabled_lockfile))
    }

    pub fn with_splay(mut self, splay: Splay) -> Self {
        self.splay = splay;
        self
    }

    pub fn with_fork(mut self, should_fork: bool) -> Self {
        self.should_fork = should_fork;
        self
    }

    /// How isolated runs start their child process.
    pub fn with_launcher(mut self, launcher: impl ChildLauncher<ClientArgs<F>>) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    pub fn with_disabler(mut self, disabler: Disabler) -> Self {
        self.disabler = Some(disabler);
        self
    }

    /// The factory this agent builds clients with.
    pub fn client_class(&self) -> &F {
        &self.factory
    }

    pub fn should_fork(&self) -> bool {
        self.should_fork
    }

    pub fn set_should_fork(&mut self, should_fork: bool) {
        self.should_fork = should_fork;
    }

    pub fn splayed(&self) -> bool {
        self.splay.splayed()
    }

    pub fn lockfile_path(&self) -> std::path::PathBuf {
        self.factory.lockfile_path()
    }

    fn run_lock(&self) -> &RunLock {
        self.run_lock
            .get_or_init(|| RunLock::new(self.factory.lockfile_path()))
    }

    pub fn disabled(&self) -> bool {
        self.disabler.as_ref().is_some_and(Disabler::disabled)
    }

    pub fn disable_message(&self) -> Option<String> {
        self.disabler.as_ref().and_then(Disabler::disable_message)
    }

    /// Whether the run lock is currently held by anyone.
    pub fn running(&self) -> Result<bool> {
        self.run_lock().locked()
    }

    /// The client of the run in progress, if there is one.
    pub fn client(&self) -> Option<Arc<F::Client>> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Ask the in-flight client, if any, to stop. For an isolated run the
    /// request goes to the child process.
    pub fn stop_client(&self) -> bool {
        if let Some(client) = self.client() {
            info!(client = %self.factory.name(), "stopping in-flight client run");
            client.stop();
            return true;
        }

        let child = self
            .child_stop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match child {
            Some(stop) => {
                info!(client = %self.factory.name(), "stopping in-flight child run");
                stop.notify_one();
                true
            }
            None => false,
        }
    }

    /// Perform one supervised client run.
    pub async fn run(&self, args: ClientArgs<F>) -> Result<RunOutcome> {
        if self.disabled() {
            info!(
                client = %self.factory.name(),
                reason = %self.disable_message().unwrap_or_default(),
                "Skipping run of {}; administratively disabled", self.factory.name()
            );
            return Ok(RunOutcome::Disabled);
        }

        if self.running()? {
            self.notice_already_running();
            return Ok(RunOutcome::AlreadyRunning);
        }

        let _serial = self.mutex.lock().await;
        let Some(lock) = self.run_lock().try_acquire()? else {
            self.notice_already_running();
            return Ok(RunOutcome::AlreadyRunning);
        };

        self.splay.splay().await;

        let outcome = if self.should_fork {
            match self.state.controlled_run(|| self.run_in_fork(args)) {
                Some(child) => RunOutcome::ChildExited(child.await?),
                None => self.skipped(),
            }
        } else {
            match self.state.controlled_run(|| self.with_client(args)) {
                Some(work) => RunOutcome::Completed(work.await?),
                None => self.skipped(),
            }
        };

        lock.release();
        debug!(client = %self.factory.name(), ?outcome, "run finished");
        Ok(outcome)
    }

    /// Run the client in a child process and return the child's exit code.
    ///
    /// The sentinel exit codes come back as [`AgentError::ChildAborted`] and
    /// [`AgentError::OutOfMemory`]. [`Agent::stop_client`] terminates the
    /// child while it runs.
    pub async fn run_in_fork(&self, args: ClientArgs<F>) -> Result<i32> {
        let launcher = self.launcher.as_ref().ok_or_else(|| {
            AgentError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no child launcher configured",
            ))
        })?;

        let mut child = isolation::spawn_child(launcher.command(&args))?;
        let stop = Arc::new(Notify::new());
        let _active = Published::enter(&self.child_stop, Arc::clone(&stop));
        child.wait(&stop).await?.into_exit_code()
    }

    /// The child side of [`Agent::run_in_fork`]: build and run the client in
    /// this process and return the exit code to report.
    ///
    /// SIGTERM stops the client, and a panic exits the process with the abort
    /// code, so call this only in a process dedicated to one run.
    pub async fn run_as_child(&self, args: ClientArgs<F>) -> i32 {
        isolation::exit_on_panic();
        let mut termination = isolation::Termination::listen();

        let work = self.with_client(args);
        tokio::pin!(work);
        let result = tokio::select! {
            result = &mut work => result,
            () = termination.recv() => {
                self.stop_client();
                work.await
            }
        };
        isolation::child_exit_code(result)
    }

    /// Build a client and run it, containing every failure except memory
    /// exhaustion.
    async fn with_client(&self, args: ClientArgs<F>) -> Result<Option<i32>> {
        let client = match self.factory.build() {
            Ok(client) => Arc::new(client),
            Err(err) => return self.client_failure("create", err),
        };

        let _active = Published::enter(&self.client, Arc::clone(&client));
        match client.run(args).await {
            Ok(status) => Ok(status),
            Err(err) => self.client_failure("run", err),
        }
    }

    fn client_failure(&self, action: &str, err: anyhow::Error) -> Result<Option<i32>> {
        if is_out_of_memory(&err) {
            return Err(AgentError::OutOfMemory);
        }
        error!(
            client = %self.factory.name(),
            error = %format!("{err:#}"),
            "Could not {} {}", action, self.factory.name()
        );
        Ok(None)
    }

    fn skipped(&self) -> RunOutcome {
        let status = self.state.run_status();
        info!(
            client = %self.factory.name(),
            run_status = %status,
            "Shutdown/restart in progress ({}); skipping run", status
        );
        RunOutcome::Skipped(status)
    }

    fn notice_already_running(&self) {
        let lock = self.run_lock();
        info!(
            client = %self.factory.name(),
            lockfile = %lock.path().display(),
            holder_pid = ?lock.holder_pid(),
            "Run of {} already in progress; skipping", self.factory.name()
        );
    }
}

impl<F: ClientFactory + fmt::Debug> fmt::Debug for Agent<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("factory", &self.factory)
            .field("should_fork", &self.should_fork)
            .field("isolated", &self.launcher.is_some())
            .field("splay", &self.splay)
            .field("disabler", &self.disabler)
            .finish_non_exhaustive()
    }
}

/// Fills a slot (the running client, or the stop handle of a running child)
/// for the duration of a run.
struct Published<'a, T> {
    slot: &'a Mutex<Option<Arc<T>>>,
}

impl<'a, T> Published<'a, T> {
    fn enter(slot: &'a Mutex<Option<Arc<T>>>, value: Arc<T>) -> Self {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
        Self { slot }
    }
}

impl<T> Drop for Published<'_, T> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
