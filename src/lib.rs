//! Ratekeeper - In-process Rate Limiting
//!
//! This crate implements per-client admission control with five algorithms:
//! fixed window, sliding window log, sliding window counter, leaky bucket and
//! token bucket. Limiters are built by a factory from a strategy tag or from
//! configuration and are safe to share across threads.

pub mod config;
pub mod error;
pub mod ratelimit;
pub mod simulate;
