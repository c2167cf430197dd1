//! Sliding window log.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock, Resolution};
use super::limiter::{RateLimiter, StrategyKind};
use super::store::{ClientKey, ClientStateStore};
use crate::error::{nonzero, nonzero_window, Result};

/// Admission times retained for one client, oldest first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlidingWindowLogState {
    pub timestamps: VecDeque<f64>,
}

/// Admits a request when fewer than `max_requests` admissions happened in
/// the trailing `window`.
///
/// Exact, at the cost of keeping up to `max_requests` timestamps per client.
pub struct SlidingWindowLogLimiter<K: ClientKey = String> {
    max_requests: u64,
    window: f64,
    resolution: Resolution,
    clock: Arc<dyn Clock>,
    store: ClientStateStore<K, SlidingWindowLogState>,
}

impl<K: ClientKey> SlidingWindowLogLimiter<K> {
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

    /// Current log for a client, if it has been seen.
    pub fn state(&self, client: &K) -> Option<SlidingWindowLogState> {
        self.store.snapshot(client)
    }

    fn now(&self) -> f64 {
        self.resolution.apply(self.clock.now())
    }
}

impl<K: ClientKey> RateLimiter<K> for SlidingWindowLogLimiter<K> {
    fn allow(&self, client: &K) -> bool {
        let (max_requests, window) = (self.max_requests, self.window);

        self.store.update(
            client,
            || self.now(),
            |_| SlidingWindowLogState::default(),
            |state, now| {
                let log = &mut state.timestamps;
                while log.front().is_some_and(|&oldest| now - oldest >= window) {
                    log.pop_front();
                }

                if (log.len() as u64) < max_requests {
                    log.push_back(now);
                    trace!(in_window = log.len(), limit = max_requests, "Request admitted");
                    true
                } else {
                    debug!(in_window = log.len(), limit = max_requests, "Sliding log limit exceeded");
                    false
                }
            },
        )
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::SlidingLog
    }

    fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    fn evict_idle(&self, idle: Duration) -> usize {
        self.store.evict_idle(self.now(), idle.as_secs_f64())
    }
}
