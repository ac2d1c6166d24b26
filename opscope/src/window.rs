//! Rolling-rate windows.
//!
//! A window records event timestamps in a FIFO and computes a live rate by
//! pruning entries older than its duration *then* dividing the remaining
//! count by the window length in seconds. This prune-then-divide shape is
//! the contract; it is a windowed count, not a decaying average.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Time-bounded event counter producing a live events-per-second rate.
#[derive(Debug)]
pub struct RollingWindow {
    duration: Duration,
    samples: Mutex<VecDeque<Instant>>,
}

impl RollingWindow {
    /// Create a window covering `duration`.
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            samples: Mutex::new(VecDeque::new()),
        }
    }

    /// Record one event at the current instant.
    pub fn record(&self) {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        samples.push_back(Instant::now());
    }

    /// Events per second over the window.
    ///
    /// Entries older than the window duration at query time are pruned
    /// first and never counted.
    #[must_use]
    pub fn rate(&self) -> f64 {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut samples, self.duration);
        samples.len() as f64 / self.duration.as_secs_f64()
    }

    /// Events currently inside the window.
    #[must_use]
    pub fn count(&self) -> usize {
        let mut samples = self.samples.lock().unwrap_or_else(|e| e.into_inner());
        Self::prune(&mut samples, self.duration);
        samples.len()
    }

    // A cutoff earlier than the clock's origin means nothing is stale yet.
    fn prune(samples: &mut VecDeque<Instant>, duration: Duration) {
        let Some(cutoff) = Instant::now().checked_sub(duration) else {
            return;
        };
        while samples.front().is_some_and(|t| *t < cutoff) {
            samples.pop_front();
        }
    }

    /// Discard every recorded event.
    pub fn clear(&self) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// The configured window duration.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        self.duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_zero_after_clear() {
        let window = RollingWindow::new(Duration::from_secs(10));
        window.record();
        window.record();
        assert!(window.rate() > 0.0);

        window.clear();
        assert!((window.rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_counts_recent_events() {
        let window = RollingWindow::new(Duration::from_secs(10));
        for _ in 0..5 {
            window.record();
        }
        // 5 events over a 10 second window.
        assert!((window.rate() - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_old_entries_pruned() {
        let window = RollingWindow::new(Duration::from_millis(20));
        window.record();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(window.count(), 0);
        assert!((window.rate() - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_bounded_by_count() {
        let window = RollingWindow::new(Duration::from_secs(1));
        for _ in 0..100 {
            window.record();
        }
        assert!(window.rate() <= 100.0);
        assert!(window.rate() >= 0.0);
    }
}
