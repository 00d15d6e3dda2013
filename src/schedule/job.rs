// src/schedule/job.rs

use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use crate::agent::BoxFuture;
use crate::errors::Result;

/// Callback fired each time a job runs. A fatal `Err` ends the scheduler loop.
pub type JobCallback = Box<dyn FnMut() -> BoxFuture<'static, Result<()>> + Send>;

/// A repeating unit of work.
///
/// A job is ready when it has never run, or when its interval has elapsed
/// since the last run give or take `tolerance`.
pub struct Job {
    name: String,
    interval: Duration,
    tolerance: Duration,
    start_immediately: bool,
    enabled: bool,
    last_run: Option<Instant>,
    callback: JobCallback,
}

impl Job {
    /// A job that starts immediately with no tolerance.
    pub fn new<C>(name: impl Into<String>, interval: Duration, callback: C) -> Self
    where
        C: FnMut() -> BoxFuture<'static, Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            interval,
            tolerance: Duration::ZERO,
            start_immediately: true,
            enabled: true,
            last_run: None,
            callback: Box::new(callback),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn start_immediately(mut self, start_immediately: bool) -> Self {
        self.start_immediately = start_immediately;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    pub fn last_run(&self) -> Option<Instant> {
        self.last_run
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn ready(&self, now: Instant) -> bool {
        match self.last_run {
            None => true,
            Some(last) => last + self.interval <= now + self.tolerance,
        }
    }

    /// Time from `now` until the job is due; zero when it is ready.
    pub fn interval_to_next_from(&self, now: Instant) -> Duration {
        match self.last_run {
            _ if self.ready(now) => Duration::ZERO,
            Some(last) => (last + self.interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Anchor a job that must not start immediately to the loop start.
    pub(crate) fn mark_start(&mut self, now: Instant) {
        if !self.start_immediately && self.last_run.is_none() {
            self.last_run = Some(now);
        }
    }

    /// Make the job ready regardless of when it last ran.
    pub(crate) fn make_ready(&mut self) {
        self.last_run = None;
    }

    pub(crate) async fn run(&mut self, now: Instant) -> Result<()> {
        self.last_run = Some(now);
        (self.callback)().await
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("tolerance", &self.tolerance)
            .field("start_immediately", &self.start_immediately)
            .field("enabled", &self.enabled)
            .field("last_run", &self.last_run)
            .finish_non_exhaustive()
    }
}
