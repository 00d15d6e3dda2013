// src/schedule/mod.rs

//! Repeating timers that drive the agent.
//!
//! - [`job`] holds one repeating unit (interval, tolerance, last run).
//! - [`scheduler`] owns the run loop over a set of jobs and the
//!   [`SchedulerHandle`] used to wake it from outside.

pub mod job;
pub mod scheduler;

pub use job::{Job, JobCallback};
pub use scheduler::{Scheduler, SchedulerHandle};
