//! Fixed window counter.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock, Resolution};
use super::limiter::{RateLimiter, StrategyKind};
use super::store::{ClientKey, ClientStateStore};
use crate::error::{nonzero, nonzero_window, Result};

/// Per-client state of a fixed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedWindowState {
    /// When the current window opened
    pub window_start: f64,
    /// Requests admitted in the current window
    pub count: u64,
}

/// Admits up to `max_requests` per client in each window.
///
/// A window opens on a client's first request and is replaced wholesale once
/// `window` has elapsed. Because the reset is hard, a client can be admitted
/// up to `2 * max_requests` times across a window boundary.
pub struct FixedWindowLimiter<K: ClientKey = String> {
    max_requests: u64,
    window: f64,
    resolution: Resolution,
    clock: Arc<dyn Clock>,
    store: ClientStateStore<K, FixedWindowState>,
}

impl<K: ClientKey> FixedWindowLimiter<K> {
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

    /// Current state for a client, if it has been seen.
    pub fn state(&self, client: &K) -> Option<FixedWindowState> {
        self.store.snapshot(client)
    }

    fn now(&self) -> f64 {
        self.resolution.apply(self.clock.now())
    }
}

impl<K: ClientKey> RateLimiter<K> for FixedWindowLimiter<K> {
    fn allow(&self, client: &K) -> bool {
        let (max_requests, window) = (self.max_requests, self.window);

        self.store.update(
            client,
            || self.now(),
            |now| FixedWindowState {
                window_start: now,
                count: 0,
            },
            |state, now| {
                if now - state.window_start >= window {
                    trace!(
                        window_start = state.window_start,
                        now,
                        "Fixed window expired, resetting"
                    );
                    state.window_start = now;
                    state.count = 0;
                }

                if state.count < max_requests {
                    state.count += 1;
                    trace!(count = state.count, limit = max_requests, "Request admitted");
                    true
                } else {
                    debug!(count = state.count, limit = max_requests, "Fixed window limit exceeded");
                    false
                }
            },
        )
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Fixed
    }

    fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    fn evict_idle(&self, idle: Duration) -> usize {
        self.store.evict_idle(self.now(), idle.as_secs_f64())
    }
}
