// tests/scheduler_loop.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::Level;

use nodeagent::agent::BoxFuture;
use nodeagent::errors::{AgentError, Result};
use nodeagent::schedule::{Job, Scheduler};
use nodeagent::state::{ApplicationState, RunStateController};
use nodeagent_test_utils::observe::counting_subscriber;

fn scheduler_for(state: &Arc<ApplicationState>) -> Scheduler {
    Scheduler::new(Arc::clone(state) as Arc<dyn RunStateController>)
}

/// A job that reports the instant of every run on `tx`.
fn reporting_job(name: &str, interval: Duration, tx: mpsc::UnboundedSender<Instant>) -> Job {
    Job::new(name, interval, move || -> BoxFuture<'static, Result<()>> {
        let _ = tx.send(Instant::now());
        Box::pin(async { Ok(()) })
    })
}

/// A job that requests a stop on its `stop_after`-th run.
fn counting_job(
    interval: Duration,
    state: Arc<ApplicationState>,
    stop_after: usize,
) -> (Job, Arc<AtomicUsize>) {
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let job = Job::new("counting", interval, move || -> BoxFuture<'static, Result<()>> {
        if counter.fetch_add(1, Ordering::SeqCst) + 1 >= stop_after {
            state.request_stop();
        }
        Box::pin(async { Ok(()) })
    });
    (job, runs)
}

#[tokio::test(start_paused = true)]
async fn runs_immediately_then_on_every_interval() {
    let state = Arc::new(ApplicationState::new());
    let (job, runs) = counting_job(Duration::from_secs(10), Arc::clone(&state), 3);
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(job);

    let start = Instant::now();
    scheduler.run_loop().await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(runs.load(Ordering::SeqCst), 3);
    assert!(elapsed >= Duration::from_secs(20), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(21), "elapsed {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn delayed_job_waits_one_interval() {
    let state = Arc::new(ApplicationState::new());
    let (job, runs) = counting_job(Duration::from_secs(30), Arc::clone(&state), 1);
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(job.start_immediately(false));

    let start = Instant::now();
    scheduler.run_loop().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn pending_stop_prevents_any_run() {
    let state = Arc::new(ApplicationState::new());
    let (job, runs) = counting_job(Duration::from_secs(10), Arc::clone(&state), 100);
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(job);

    state.request_stop();
    scheduler.run_loop().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn loop_ends_when_every_job_is_disabled() {
    let state = Arc::new(ApplicationState::new());
    let (mut job, runs) = counting_job(Duration::from_secs(10), Arc::clone(&state), 100);
    job.disable();
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(job);

    scheduler.run_loop().await.unwrap();

    assert_eq!(runs.load(Ordering::SeqCst), 0);
    assert!(!scheduler.jobs()[0].enabled());
}

#[tokio::test(start_paused = true)]
async fn run_now_and_wake_reach_a_sleeping_loop() {
    let state = Arc::new(ApplicationState::new());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(reporting_job("hourly", Duration::from_secs(3600), tx));
    let handle = scheduler.handle();

    let task = tokio::spawn(async move {
        scheduler.run_loop().await.unwrap();
        scheduler
    });

    let first = rx.recv().await.unwrap();
    handle.run_now();
    let second = rx.recv().await.unwrap();
    assert!(second.duration_since(first) < Duration::from_secs(3600));

    state.request_stop();
    handle.wake();
    let scheduler = task.await.unwrap();
    assert!(scheduler.jobs()[0].last_run().is_some());
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn jobs_run_in_insertion_order() {
    let state = Arc::new(ApplicationState::new());
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let (stopper, _) = counting_job(Duration::from_secs(5), Arc::clone(&state), 1);

    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(reporting_job("a", Duration::from_secs(5), tx_a));
    scheduler.add_job(reporting_job("b", Duration::from_secs(5), tx_b));
    scheduler.add_job(stopper);

    scheduler.run_loop().await.unwrap();

    let a = rx_a.recv().await.unwrap();
    let b = rx_b.recv().await.unwrap();
    assert!(a <= b);
    let names: Vec<_> = scheduler.jobs().iter().map(|j| j.name().to_string()).collect();
    assert_eq!(names, ["a", "b", "counting"]);
}

#[tokio::test(start_paused = true)]
async fn fatal_job_error_ends_the_loop() {
    let state = Arc::new(ApplicationState::new());
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(Job::new(
        "failing",
        Duration::from_secs(10),
        || -> BoxFuture<'static, Result<()>> {
            Box::pin(async { Err(AgentError::OutOfMemory) })
        },
    ));

    let err = scheduler.run_loop().await.unwrap_err();
    assert!(matches!(err, AgentError::OutOfMemory));
}

#[tokio::test(start_paused = true)]
async fn non_fatal_job_error_is_logged_and_retried() {
    let (observed, _guard) = counting_subscriber();
    let state = Arc::new(ApplicationState::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let mut scheduler = scheduler_for(&state);
    scheduler.add_job(Job::new("flaky", Duration::from_secs(10), {
        let attempts = Arc::clone(&attempts);
        let state = Arc::clone(&state);
        move || -> BoxFuture<'static, Result<()>> {
            if attempts.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
                state.request_stop();
            }
            Box::pin(async { Err(AgentError::ConfigError("lockfile unreadable".into())) })
        }
    }));

    scheduler.run_loop().await.unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(observed.errors(), 3);
    assert!(observed.saw(Level::ERROR, "job failed"));
}
