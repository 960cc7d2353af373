//! Clock port: where wall-clock time comes from.
//!
//! Sleeping always goes through `tokio::time` so that it can be paused in
//! tests. Reading the time of day goes through this trait instead.

use chrono::{DateTime, TimeDelta, Utc};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time, in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        rulehub_domain::time::now()
    }
}

/// Clock anchored at a fixed wall time that advances with tokio's clock.
///
/// Under a paused tokio runtime the wall time only moves when tokio time
/// does, which keeps time-of-day triggers deterministic.
#[derive(Debug, Clone, Copy)]
pub struct AnchoredClock {
    origin: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl AnchoredClock {
    /// Start counting from `origin` now.
    #[must_use]
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for AnchoredClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.started.elapsed()).unwrap_or(TimeDelta::MAX);
        self.origin + elapsed
    }
}
