use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use tokio::sync::Notify;

use nodeagent::agent::{BoxFuture, Client, ClientFactory};
use nodeagent::lock::RunLock;

/// What a [`FakeClient`] does when built and run.
#[derive(Debug, Clone)]
pub enum Behaviour {
    /// Run successfully and report this status.
    Return(Option<i32>),
    /// Fail while the factory builds the client.
    FailBuild,
    /// Build fine, fail during `run`.
    FailRun,
    /// Fail during `run` with memory exhaustion.
    OutOfMemory,
    /// Block until the notify fires (status 0) or `stop` is called (no status).
    Hold(Arc<Notify>),
    /// Panic during `run`.
    Panic,
}

impl Behaviour {
    /// Encoding used to hand a behaviour to a child process.
    pub fn to_env(&self) -> String {
        match self {
            Behaviour::Return(Some(code)) => format!("return:{code}"),
            Behaviour::Return(None) => "return".to_string(),
            Behaviour::FailBuild => "fail-build".to_string(),
            Behaviour::FailRun => "fail-run".to_string(),
            Behaviour::OutOfMemory => "out-of-memory".to_string(),
            Behaviour::Hold(_) => "hold".to_string(),
            Behaviour::Panic => "panic".to_string(),
        }
    }

    /// Inverse of [`Behaviour::to_env`]. A decoded `Hold` is only released
    /// by `stop`.
    pub fn from_env(value: &str) -> Option<Self> {
        match value {
            "return" => Some(Behaviour::Return(None)),
            "fail-build" => Some(Behaviour::FailBuild),
            "fail-run" => Some(Behaviour::FailRun),
            "out-of-memory" => Some(Behaviour::OutOfMemory),
            "hold" => Some(Behaviour::Hold(Arc::new(Notify::new()))),
            "panic" => Some(Behaviour::Panic),
            other => other
                .strip_prefix("return:")?
                .parse()
                .ok()
                .map(|code| Behaviour::Return(Some(code))),
        }
    }
}

/// Per-run arguments; recorded by the fake so tests can inspect them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeArgs {
    pub tag: Option<String>,
}

/// Counters shared between a [`FakeFactory`], its clients and the test.
#[derive(Debug, Default)]
pub struct FakeStats {
    constructions: AtomicUsize,
    runs: AtomicUsize,
    stops: AtomicUsize,
    lock_held: Mutex<Vec<bool>>,
    args: Mutex<Vec<FakeArgs>>,
    started: Notify,
}

impl FakeStats {
    pub fn constructions(&self) -> usize {
        self.constructions.load(Ordering::SeqCst)
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// For every run so far, whether the run lock was held while it ran.
    pub fn lock_held_during_runs(&self) -> Vec<bool> {
        self.lock_held.lock().unwrap().clone()
    }

    pub fn args(&self) -> Vec<FakeArgs> {
        self.args.lock().unwrap().clone()
    }

    /// Resolves once a run has started.
    pub async fn wait_started(&self) {
        self.started.notified().await;
    }
}

/// A client factory whose clients follow a scripted [`Behaviour`].
#[derive(Debug, Clone)]
pub struct FakeFactory {
    name: String,
    lockfile: PathBuf,
    behaviour: Behaviour,
    started_marker: Option<PathBuf>,
    stats: Arc<FakeStats>,
}

impl FakeFactory {
    pub fn new(lockfile: impl Into<PathBuf>, behaviour: Behaviour) -> Self {
        Self {
            name: "fake".to_string(),
            lockfile: lockfile.into(),
            behaviour,
            started_marker: None,
            stats: Arc::new(FakeStats::default()),
        }
    }

    /// Create `path` when a client run starts; visible across processes.
    pub fn with_started_marker(mut self, path: impl Into<PathBuf>) -> Self {
        self.started_marker = Some(path.into());
        self
    }

    /// A factory whose clients succeed with status 0.
    pub fn succeeding(lockfile: impl Into<PathBuf>) -> Self {
        Self::new(lockfile, Behaviour::Return(Some(0)))
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        Arc::clone(&self.stats)
    }

    pub fn lockfile(&self) -> &Path {
        &self.lockfile
    }
}

impl ClientFactory for FakeFactory {
    type Client = FakeClient;

    fn name(&self) -> &str {
        &self.name
    }

    fn lockfile_path(&self) -> PathBuf {
        self.lockfile.clone()
    }

    fn build(&self) -> anyhow::Result<FakeClient> {
        self.stats.constructions.fetch_add(1, Ordering::SeqCst);
        if matches!(self.behaviour, Behaviour::FailBuild) {
            return Err(anyhow!("fake client could not be built"));
        }
        Ok(FakeClient {
            lockfile: self.lockfile.clone(),
            behaviour: self.behaviour.clone(),
            started_marker: self.started_marker.clone(),
            stats: Arc::clone(&self.stats),
            stop: Notify::new(),
        })
    }
}

#[derive(Debug)]
pub struct FakeClient {
    lockfile: PathBuf,
    behaviour: Behaviour,
    started_marker: Option<PathBuf>,
    stats: Arc<FakeStats>,
    stop: Notify,
}

impl Client for FakeClient {
    type Args = FakeArgs;

    fn run(&self, args: FakeArgs) -> BoxFuture<'_, anyhow::Result<Option<i32>>> {
        Box::pin(async move {
            self.stats.runs.fetch_add(1, Ordering::SeqCst);
            let held = RunLock::new(&self.lockfile).locked().unwrap_or(false);
            self.stats.lock_held.lock().unwrap().push(held);
            self.stats.args.lock().unwrap().push(args);
            self.stats.started.notify_one();
            if let Some(marker) = &self.started_marker {
                std::fs::write(marker, std::process::id().to_string())?;
            }

            match &self.behaviour {
                Behaviour::Return(status) => Ok(*status),
                Behaviour::FailBuild => unreachable!("build already failed"),
                Behaviour::FailRun => Err(anyhow!("fake client run failed")),
                Behaviour::OutOfMemory => Err(anyhow::Error::new(io::Error::new(
                    io::ErrorKind::OutOfMemory,
                    "fake allocation failure",
                ))
                .context("compiling catalog")),
                Behaviour::Hold(release) => {
                    tokio::select! {
                        _ = release.notified() => Ok(Some(0)),
                        _ = self.stop.notified() => Ok(None),
                    }
                }
                Behaviour::Panic => panic!("fake client panicked"),
            }
        })
    }

    fn stop(&self) {
        self.stats.stops.fetch_add(1, Ordering::SeqCst);
        self.stop.notify_one();
    }
}
