// src/agent/splay.rs

//! One-shot random startup delay.
//!
//! A fleet of nodes sharing one `runinterval` would otherwise hit the server
//! in lockstep. Before the first run of its lifetime the agent sleeps for a
//! whole number of seconds drawn uniformly from `[0, splaylimit]`; every later
//! call is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::Rng;
use tracing::info;

/// Source of random draws: given `bound`, return a value in `[0, bound)`.
pub type SplayDraw = Box<dyn Fn(u64) -> u64 + Send + Sync>;

pub struct Splay {
    enabled: bool,
    limit: Duration,
    splayed: AtomicBool,
    draw: SplayDraw,
}

impl Splay {
    pub fn new(enabled: bool, limit: Duration) -> Self {
        Self {
            enabled,
            limit,
            splayed: AtomicBool::new(false),
            draw: Box::new(|bound| rand::thread_rng().gen_range(0..bound)),
        }
    }

    /// A splay that never sleeps.
    pub fn disabled() -> Self {
        Self::new(false, Duration::ZERO)
    }

    /// Replace the random source.
    pub fn with_draw(mut self, draw: impl Fn(u64) -> u64 + Send + Sync + 'static) -> Self {
        self.draw = Box::new(draw);
        self
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub fn splayed(&self) -> bool {
        self.splayed.load(Ordering::SeqCst)
    }

    /// The delay for one draw; the upper bound `splaylimit` is inclusive.
    pub fn delay(&self) -> Duration {
        let bound = self.limit.as_secs().saturating_add(1);
        Duration::from_secs((self.draw)(bound))
    }

    /// Sleep once per lifetime. Returns the delay slept, or `None` when
    /// splay is disabled or already happened.
    pub async fn splay(&self) -> Option<Duration> {
        if !self.enabled || self.splayed() {
            return None;
        }

        let delay = self.delay();
        info!(seconds = delay.as_secs(), "Sleeping for {} seconds (splay is enabled)", delay.as_secs());
        tokio::time::sleep(delay).await;
        self.splayed.store(true, Ordering::SeqCst);
        Some(delay)
    }
}

impl fmt::Debug for Splay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Splay")
            .field("enabled", &self.enabled)
            .field("limit", &self.limit)
            .field("splayed", &self.splayed())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_space_includes_the_limit() {
        let splay = Splay::new(true, Duration::from_secs(50)).with_draw(|bound| {
            assert_eq!(bound, 51);
            10
        });
        assert_eq!(splay.delay(), Duration::from_secs(10));
    }

    #[test]
    fn default_draw_stays_in_range() {
        let splay = Splay::new(true, Duration::from_secs(3));
        for _ in 0..200 {
            assert!(splay.delay() <= Duration::from_secs(3));
        }
        assert_eq!(Splay::new(true, Duration::ZERO).delay(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn sleeps_only_once() {
        let splay = Splay::new(true, Duration::from_secs(50)).with_draw(|_| 10);

        let start = tokio::time::Instant::now();
        assert_eq!(splay.splay().await, Some(Duration::from_secs(10)));
        let slept = start.elapsed();
        assert!(slept >= Duration::from_secs(10) && slept < Duration::from_secs(11));
        assert!(splay.splayed());

        let again = tokio::time::Instant::now();
        assert_eq!(splay.splay().await, None);
        assert!(again.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_splay_never_sleeps() {
        let splay = Splay::new(false, Duration::from_secs(50));
        assert_eq!(splay.splay().await, None);
        assert!(!splay.splayed());
    }
}
