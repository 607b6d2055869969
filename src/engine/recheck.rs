//! Bounded-staleness timer for scans

use tokio::time::{Duration, Instant};

/// Fires at most once per interval while a worker scans an iteration.
pub(crate) struct Recheck {
    interval: Duration,
    next: Instant,
}

impl Recheck {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now() + interval,
        }
    }

    /// True once the interval has elapsed; re-arms itself when it fires.
    pub(crate) fn due(&mut self) -> bool {
        let now = Instant::now();
        if now < self.next {
            return false;
        }
        self.next = now + self.interval;
        true
    }
}
