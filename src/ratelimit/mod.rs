//! Rate limiting algorithms and per-client state management.

mod clock;
mod factory;
mod fixed_window;
mod leaky_bucket;
mod limiter;
mod sliding_counter;
mod sliding_log;
mod store;
mod token_bucket;

pub use clock::{Clock, ManualClock, MonotonicClock, Resolution};
pub use factory::{LimiterFactory, LimiterSpec};
pub use fixed_window::{FixedWindowLimiter, FixedWindowState};
pub use leaky_bucket::{LeakyBucketLimiter, LeakyBucketState};
pub use limiter::{RateLimiter, StrategyKind};
pub use sliding_counter::{SlidingWindowCounterLimiter, SlidingWindowCounterState};
pub use sliding_log::{SlidingWindowLogLimiter, SlidingWindowLogState};
pub use store::{ClientKey, ClientStateStore};
pub use token_bucket::{TokenBucketLimiter, TokenBucketState};
