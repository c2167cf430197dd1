//! Sliding window counter, reset-at-boundary variant.
//!
//! Time is cut into windows indexed by `floor(now / window)`. Buckets from
//! earlier windows are purged before counting, and the previous window's
//! trailing requests are not interpolated into the current total. The
//! burst behaviour at a boundary therefore matches the fixed window, except
//! that boundaries are aligned to the clock's origin rather than to each
//! client's first request.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock, Resolution};
use super::limiter::{RateLimiter, StrategyKind};
use super::store::{ClientKey, ClientStateStore};
use crate::error::{nonzero, nonzero_window, Result};

/// Request counts per window index for one client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlidingWindowCounterState {
    pub buckets: BTreeMap<i64, u64>,
}

impl SlidingWindowCounterState {
    /// Sum of all retained bucket counts.
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }
}

/// Admits up to `max_requests` per client in each window of the shared,
/// origin-aligned grid.
///
/// Only counts are kept, so memory per client stays constant whatever the
/// quota.
pub struct SlidingWindowCounterLimiter<K: ClientKey = String> {
    max_requests: u64,
    window: f64,
    resolution: Resolution,
    clock: Arc<dyn Clock>,
    store: ClientStateStore<K, SlidingWindowCounterState>,
}

impl<K: ClientKey> SlidingWindowCounterLimiter<K> {
    /// Create a limiter driven by a [`MonotonicClock`].
    pub fn new(max_requests: u64, window: Duration) -> Result<Self> {
        Self::with_clock(max_requests, window, Arc::new(MonotonicClock::new()))
    }

    /// Create a limiter driven by the given clock.
    pub fn with_clock(max_requests: u64, window: Duration, clock: Arc<dyn Clock>) -> Result<Self> {
        let window = nonzero_window("window", window)?;
        Ok(Self {
            max_requests: nonzero("max_requests", max_requests)?,
            window,
            resolution: Resolution::default().for_window(window),
            clock,
            store: ClientStateStore::new(),
        })
    }

    /// Sample the clock at a different resolution.
    ///
    /// A window that is not a whole number of seconds keeps fractional
    /// sampling regardless.
    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution.for_window(self.window);
        self
    }

    /// Current buckets for a client, if it has been seen.
    pub fn state(&self, client: &K) -> Option<SlidingWindowCounterState> {
        self.store.snapshot(client)
    }

    fn now(&self) -> f64 {
        self.resolution.apply(self.clock.now())
    }
}

impl<K: ClientKey> RateLimiter<K> for SlidingWindowCounterLimiter<K> {
    fn allow(&self, client: &K) -> bool {
        let (max_requests, window) = (self.max_requests, self.window);

        self.store.update(
            client,
            || self.now(),
            |_| SlidingWindowCounterState::default(),
            |state, now| {
                let current = (now / window).floor() as i64;
                state.buckets.retain(|&index, _| index >= current);

                let total = state.total();
                if total < max_requests {
                    *state.buckets.entry(current).or_insert(0) += 1;
                    trace!(window_index = current, total = total + 1, limit = max_requests, "Request admitted");
                    true
                } else {
                    debug!(window_index = current, total, limit = max_requests, "Sliding counter limit exceeded");
                    false
                }
            },
        )
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::SlidingCounter
    }

    fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    fn evict_idle(&self, idle: Duration) -> usize {
        self.store.evict_idle(self.now(), idle.as_secs_f64())
    }
}
