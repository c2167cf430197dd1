//! Token bucket.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use super::clock::{Clock, MonotonicClock, EPSILON};
use super::limiter::{RateLimiter, StrategyKind};
use super::store::{ClientKey, ClientStateStore};
use crate::error::{positive, Result};

/// Per-client credit balance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenBucketState {
    /// Credits available, possibly fractional
    pub tokens: f64,
    /// Time the balance was last refilled
    pub last_update: f64,
}

/// Grants one token per request from a bucket refilled at `rate` tokens per
/// second up to `capacity`.
///
/// New clients start with a full bucket, and an idle client accumulates
/// credit again, so bursts of up to `capacity` requests are admitted.
pub struct TokenBucketLimiter<K: ClientKey = String> {
    capacity: f64,
    rate: f64,
    clock: Arc<dyn Clock>,
    store: ClientStateStore<K, TokenBucketState>,
}

impl<K: ClientKey> TokenBucketLimiter<K> {
    /// Create a limiter driven by a [`MonotonicClock`].
    pub fn new(capacity: f64, rate: f64) -> Result<Self> {
        Self::with_clock(capacity, rate, Arc::new(MonotonicClock::new()))
    }

    /// Create a limiter driven by the given clock.
    pub fn with_clock(capacity: f64, rate: f64, clock: Arc<dyn Clock>) -> Result<Self> {
        Ok(Self {
            capacity: positive("capacity", capacity)?,
            rate: positive("rate", rate)?,
            clock,
            store: ClientStateStore::new(),
        })
    }

    /// Current balance for a client, if it has been seen.
    pub fn state(&self, client: &K) -> Option<TokenBucketState> {
        self.store.snapshot(client)
    }
}

impl<K: ClientKey> RateLimiter<K> for TokenBucketLimiter<K> {
    fn allow(&self, client: &K) -> bool {
        let (capacity, rate) = (self.capacity, self.rate);

        self.store.update(
            client,
            || self.clock.now(),
            |now| TokenBucketState {
                tokens: capacity,
                last_update: now,
            },
            |state, now| {
                let elapsed = (now - state.last_update).max(0.0);
                state.tokens = (state.tokens + elapsed * rate).min(capacity);
                state.last_update = now;

                if state.tokens + EPSILON >= 1.0 {
                    state.tokens = (state.tokens - 1.0).max(0.0);
                    trace!(tokens = state.tokens, capacity, "Request admitted");
                    true
                } else {
                    debug!(tokens = state.tokens, capacity, "Token bucket empty");
                    false
                }
            },
        )
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Token
    }

    fn tracked_clients(&self) -> usize {
        self.store.len()
    }

    fn evict_idle(&self, idle: Duration) -> usize {
        self.store.evict_idle(self.clock.now(), idle.as_secs_f64())
    }
}
