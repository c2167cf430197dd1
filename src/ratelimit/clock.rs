//! Monotonic time sources for the limiters.
//!
//! All limiters read time as fractional seconds since an arbitrary origin.
//! Only differences between readings are meaningful.

use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Slack for f64 rounding when comparing quantities derived from elapsed time.
pub(crate) const EPSILON: f64 = 1e-9;

/// A source of monotonic time.
pub trait Clock: Send + Sync + Debug {
    /// Seconds elapsed since the clock's origin. Never decreases.
    fn now(&self) -> f64;
}

/// Wall-independent clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Create a clock whose origin is the moment of construction.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same reading, so a test can keep one handle and give
/// another to the limiter under test. The reading is kept as a [`Duration`],
/// so repeated small advances do not accumulate float error.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// Create a clock reading zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock();
        *elapsed = elapsed.saturating_add(by);
    }

    /// Move the clock forward by a fractional number of seconds.
    ///
    /// Negative or unrepresentable values are ignored; the clock never runs
    /// backwards.
    pub fn advance_secs(&self, secs: f64) {
        if let Ok(by) = Duration::try_from_secs_f64(secs) {
            self.advance(by);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        self.elapsed.lock().as_secs_f64()
    }
}

/// Granularity at which a limiter samples its clock.
///
/// The window algorithms count in whole seconds by default; the bucket
/// algorithms always work with fractional time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Truncate readings to whole seconds
    #[default]
    WholeSeconds,
    /// Use readings as-is
    Fractional,
}

impl Resolution {
    /// The resolution to use for a window of `window_secs`.
    ///
    /// Whole-second readings cannot express a window that is not a whole
    /// number of seconds, so such windows always sample fractionally.
    pub fn for_window(self, window_secs: f64) -> Self {
        if window_secs.fract() == 0.0 {
            self
        } else {
            Resolution::Fractional
        }
    }

    /// Apply this resolution to a clock reading.
    pub fn apply(self, seconds: f64) -> f64 {
        match self {
            Resolution::WholeSeconds => seconds.floor(),
            Resolution::Fractional => seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new();
        let handle = clock.clone();

        assert_eq!(clock.now(), 0.0);
        handle.advance(Duration::from_millis(1500));
        assert_eq!(clock.now(), 1.5);

        handle.advance_secs(-10.0);
        assert_eq!(clock.now(), 1.5);
    }

    #[test]
    fn test_monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let mut last = clock.now();
        for _ in 0..1000 {
            let now = clock.now();
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn test_resolution_truncates() {
        assert_eq!(Resolution::WholeSeconds.apply(2.999), 2.0);
        assert_eq!(Resolution::Fractional.apply(2.999), 2.999);
        assert_eq!(Resolution::default(), Resolution::WholeSeconds);
    }

    #[test]
    fn test_resolution_for_window() {
        assert_eq!(Resolution::WholeSeconds.for_window(60.0), Resolution::WholeSeconds);
        assert_eq!(Resolution::WholeSeconds.for_window(0.5), Resolution::Fractional);
        assert_eq!(Resolution::WholeSeconds.for_window(1.5), Resolution::Fractional);
        assert_eq!(Resolution::Fractional.for_window(10.0), Resolution::Fractional);
    }

    #[test]
    fn test_manual_clock_small_steps_do_not_drift() {
        let clock = ManualClock::new();
        for _ in 0..20 {
            clock.advance(Duration::from_millis(50));
        }
        assert_eq!(clock.now(), 1.0);
    }
}
