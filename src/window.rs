use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Tracks the instants at which calls were dispatched, and decides whether another call fits
/// within the trailing window.
///
/// An instant stays in the window while `now - instant < window`; from then on it is stale.
#[derive(Debug)]
pub struct SlidingWindow {
    limit: usize,
    window: Duration,
    /// Oldest first.
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            timestamps: VecDeque::with_capacity(limit),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    fn is_live(&self, timestamp: Instant, now: Instant) -> bool {
        now.duration_since(timestamp) < self.window
    }

    /// Drop every timestamp that has left the window.
    /// Timestamps are recorded in non-decreasing order, so we can stop at the first live one.
    pub fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.timestamps.front() {
            if self.is_live(oldest, now) {
                break;
            }
            self.timestamps.pop_front();
        }
    }

    /// How long until a slot frees up, or `None` if one is free already.
    /// Only meaningful right after [`prune`](Self::prune) with the same `now`.
    pub fn wait_time(&self, now: Instant) -> Option<Duration> {
        if self.timestamps.len() < self.limit {
            return None;
        }
        self.timestamps
            .front()
            .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
    }

    /// Record a dispatch at `now`.
    pub fn record(&mut self, now: Instant) {
        self.timestamps.push_back(now);
    }

    /// Prune, then either claim a slot at `now` or report how long to wait for one.
    pub fn try_record(&mut self, now: Instant) -> Result<(), Duration> {
        self.prune(now);
        match self.wait_time(now) {
            Some(wait) => Err(wait),
            None => {
                self.record(now);
                Ok(())
            }
        }
    }

    /// Number of dispatches still inside the window as of `now`. Stale entries are skipped,
    /// not removed; only [`prune`](Self::prune) removes them.
    pub fn len(&self, now: Instant) -> usize {
        self.timestamps
            .iter()
            .rev()
            .take_while(|&&timestamp| self.is_live(timestamp, now))
            .count()
    }

    pub fn is_empty(&self, now: Instant) -> bool {
        self.len(now) == 0
    }

    /// The instant at which the oldest live dispatch leaves the window.
    pub fn next_release(&self, now: Instant) -> Option<Instant> {
        self.timestamps
            .iter()
            .find(|&&timestamp| self.is_live(timestamp, now))
            .map(|&oldest| oldest + self.window)
    }
}
