// src/schedule/scheduler.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::errors::Result;
use crate::state::RunStateController;

use super::job::Job;

/// Runs a set of [`Job`]s until the run state stops being clear.
///
/// Each iteration waits for the earliest due job (or a wake-up through a
/// [`SchedulerHandle`]), then runs every ready job in insertion order. A
/// fatal job error ends the loop and is returned to the caller; other job
/// errors are logged and the job runs again on its next interval.
pub struct Scheduler {
    jobs: Vec<Job>,
    state: Arc<dyn RunStateController>,
    wake: Arc<Notify>,
    run_now: Arc<AtomicBool>,
}

/// Cloneable handle for poking a running [`Scheduler`].
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    wake: Arc<Notify>,
    run_now: Arc<AtomicBool>,
}

impl SchedulerHandle {
    /// Wake the loop so it re-checks the run state promptly.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Make every job ready and wake the loop.
    pub fn run_now(&self) {
        self.run_now.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

impl Scheduler {
    pub fn new(state: Arc<dyn RunStateController>) -> Self {
        Self {
            jobs: Vec::new(),
            state,
            wake: Arc::new(Notify::new()),
            run_now: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn add_job(&mut self, job: Job) {
        self.jobs.push(job);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            wake: Arc::clone(&self.wake),
            run_now: Arc::clone(&self.run_now),
        }
    }

    /// Main loop. Returns `Ok(())` when no enabled job is left or the run
    /// state is no longer clear.
    pub async fn run_loop(&mut self) -> Result<()> {
        let start = Instant::now();
        for job in self.jobs.iter_mut() {
            job.mark_start(start);
        }

        info!(jobs = self.jobs.len(), "scheduler started");

        loop {
            if !self.keep_going() {
                break;
            }

            let wait = self.min_interval_to_next_run(Instant::now());
            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "scheduler waiting for next job");
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.wake.notified() => {
                        debug!("scheduler woken up");
                    }
                }
            }

            if self.run_now.swap(false, Ordering::SeqCst) {
                info!("immediate run requested");
                self.jobs.iter_mut().for_each(Job::make_ready);
            }

            if !self.keep_going() {
                break;
            }

            self.run_ready(Instant::now()).await?;
        }

        info!("scheduler finished");
        Ok(())
    }

    fn keep_going(&self) -> bool {
        if !self.state.clear() {
            info!(run_status = %self.state.run_status(), "run state not clear; leaving scheduler loop");
            return false;
        }
        if !self.jobs.iter().any(Job::enabled) {
            info!("no enabled jobs left; leaving scheduler loop");
            return false;
        }
        true
    }

    fn min_interval_to_next_run(&self, now: Instant) -> Duration {
        self.jobs
            .iter()
            .filter(|job| job.enabled())
            .map(|job| job.interval_to_next_from(now))
            .min()
            .unwrap_or(Duration::ZERO)
    }

    async fn run_ready(&mut self, now: Instant) -> Result<()> {
        for job in self.jobs.iter_mut() {
            if job.enabled() && job.ready(now) {
                debug!(job = %job.name(), "running job");
                match job.run(now).await {
                    Err(err) if !err.is_fatal() => {
                        error!(job = %job.name(), error = %err, "job failed");
                    }
                    result => result?,
                }
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("jobs", &self.jobs)
            .field("run_status", &self.state.run_status())
            .finish_non_exhaustive()
    }
}
