//! Leaky bucket.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock, EPSILON};
use super::limiter::{RateLimiter, StrategyKind};
use super::store::{ClientKey, ClientStateStore};
use crate::error::{positive, Result};

/// Per-client bucket contents.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeakyBucketState {
    /// Units currently queued in the bucket
    pub water_level: f64,
    /// Time the level was last recomputed
    pub last_update: f64,
}

/// Models each client as a queue of `capacity` units draining at
/// `leak_rate` units per second.
///
/// Every admitted request pours one unit in. A request is rejected when its
/// unit would overflow the bucket, so the level never exceeds `capacity`.
pub struct LeakyBucketLimiter<K: ClientKey = String> {
    capacity: f64,
    leak_rate: f64,
    clock: Arc<dyn Clock>,
    store: ClientStateStore<K, LeakyBucketState>,
}

impl<K: ClientKey> LeakyBucketLimiter<K> {
    /// Create a limiter driven by a [`MonotonicClock`].
    pub fn new(capacity: f64, leak_rate: f64) -> Result<Self> {
        Self::with_clock(capacity, leak_rate, Arc::new(MonotonicClock::new()))
    }

    /// Create a limiter driven by the given clock.
    pub fn with_clock(capacity: f64, leak_rate: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            capacity: positive("capacity", capacity)?,
            leak_rate: positive("leak_rate", leak_rate)?,
            clock,
            store: ClientStateStore::new(),
        })
    }

    /// Current bucket for a client, if it has been seen.
    ///
    /// The level is as of the client's last request; leakage since then is
    /// applied on the next call.
    pub fn state(&self, client: &K) -> Option<LeakyBucketState> {
        self.store.snapshot(client)
    }
}

impl<K: ClientKey> RateLimiter<K> for LeakyBucketLimiter<K> {
    fn allow(&self, client: &K) -> bool {
        let (capacity, leak_rate) = (self.capacity, self.leak_rate);

        self.store.update(
            client,
            || self.clock.now(),
            |now| LeakyBucketState {
                water_level: 0.0,
                last_update: now,
            },
            |state, now| {
                let elapsed = (now - state.last_update).max(0.0);
                state.water_level = (state.water_level - elapsed * leak_rate).max(0.0);
                state.last_update = now;

                if state.water_level + 1.0 <= capacity + EPSILON {
                    state.water_level = (state.water_level + 1.0).min(capacity);
                    trace!(water_level = state.water_level, capacity, "Request admitted");
                    true
                } else {
                    debug!(water_level = state.water_level, capacity, "Leaky bucket full");
                    false
                }
            },
        )
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Leaky
    }

    fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    fn evict_idle(&self, idle: Duration) -> usize {
        self.store.evict_idle(self.clock.now(), idle.as_secs_f64())
    }
}
