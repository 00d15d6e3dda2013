// src/state/mod.rs

//! Run-state oracle consulted before every client run.
//!
//! The agent never changes run state itself. An outer layer (signal handlers,
//! the config reparse job) flips the flags on [`ApplicationState`]; the agent
//! only reads them through [`RunStateController`] and refuses to *start* work
//! while a stop, restart or interrupt is pending. Work that already started is
//! never interrupted by this gate.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Read-only view of the process run state.
pub trait RunStateController: Send + Sync {
    fn stop_requested(&self) -> bool;

    fn restart_requested(&self) -> bool;

    fn interrupted(&self) -> bool;

    /// True only when no stop, restart or interrupt is pending.
    fn clear(&self) -> bool {
        !self.stop_requested() && !self.restart_requested() && !self.interrupted()
    }

    fn stopping(&self) -> bool {
        !self.clear() && self.stop_requested()
    }

    fn needing_restart(&self) -> bool {
        !self.clear() && self.restart_requested() && !self.stop_requested()
    }

    /// Snapshot of the flags, used when reporting a skipped run.
    fn run_status(&self) -> RunStatus {
        RunStatus {
            stop_requested: self.stop_requested(),
            restart_requested: self.restart_requested(),
            interrupted: self.interrupted(),
        }
    }
}

impl dyn RunStateController + '_ {
    /// Invoke `work` only if the state is clear at this instant.
    ///
    /// Returns `None` without calling `work` when a stop, restart or interrupt
    /// is pending. The returned value (often a future) is not gated any
    /// further.
    pub fn controlled_run<T>(&self, work: impl FnOnce() -> T) -> Option<T> {
        if !self.clear() {
            return None;
        }
        Some(work())
    }
}

/// Snapshot of the run-state flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStatus {
    pub stop_requested: bool,
    pub restart_requested: bool,
    pub interrupted: bool,
}

impl RunStatus {
    pub fn is_clear(&self) -> bool {
        !self.stop_requested && !self.restart_requested && !self.interrupted
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reasons = Vec::new();
        if self.stop_requested {
            reasons.push("stop_requested");
        }
        if self.restart_requested {
            reasons.push("restart_requested");
        }
        if self.interrupted {
            reasons.push("interrupted");
        }
        if reasons.is_empty() {
            write!(f, "clear")
        } else {
            write!(f, "{}", reasons.join(", "))
        }
    }
}

/// Process-wide run state driven by the daemon's signal handlers.
#[derive(Debug, Default)]
pub struct ApplicationState {
    stop_requested: AtomicBool,
    restart_requested: AtomicBool,
    interrupted: AtomicBool,
}

impl ApplicationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn request_restart(&self) {
        self.restart_requested.store(true, Ordering::SeqCst);
    }

    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    /// Forget every pending request.
    pub fn clear_requests(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
        self.restart_requested.store(false, Ordering::SeqCst);
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

impl RunStateController for ApplicationState {
    fn stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }

    fn interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(stop: bool, restart: bool, interrupted: bool) -> ApplicationState {
        let s = ApplicationState::new();
        if stop {
            s.request_stop();
        }
        if restart {
            s.request_restart();
        }
        if interrupted {
            s.interrupt();
        }
        s
    }

    #[test]
    fn predicates_over_every_flag_combination() {
        for bits in 0u8..8 {
            let (stop, restart, interrupted) = (bits & 1 != 0, bits & 2 != 0, bits & 4 != 0);
            let s = state(stop, restart, interrupted);
            let clear = !stop && !restart && !interrupted;

            assert_eq!(s.clear(), clear, "clear for {bits:03b}");
            assert_eq!(s.stopping(), !clear && stop, "stopping for {bits:03b}");
            assert_eq!(
                s.needing_restart(),
                !clear && restart && !stop,
                "needing_restart for {bits:03b}"
            );
            assert_eq!(s.run_status().is_clear(), clear);
        }
    }

    #[test]
    fn controlled_run_skips_work_unless_clear() {
        let s = ApplicationState::new();
        let controller: &dyn RunStateController = &s;

        let mut calls = 0;
        assert_eq!(controller.controlled_run(|| { calls += 1; 7 }), Some(7));
        assert_eq!(calls, 1);

        s.request_restart();
        assert_eq!(controller.controlled_run(|| { calls += 1; 7 }), None);
        assert_eq!(calls, 1);

        s.clear_requests();
        assert!(controller.controlled_run(|| ()).is_some());
    }

    #[test]
    fn run_status_names_pending_reasons() {
        assert_eq!(RunStatus::default().to_string(), "clear");
        assert_eq!(
            state(true, false, true).run_status().to_string(),
            "stop_requested, interrupted"
        );
    }
}
