//! Construction of limiters from a strategy tag or typed configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::clock::{Clock, MonotonicClock, Resolution};
use super::fixed_window::FixedWindowLimiter;
use super::leaky_bucket::LeakyBucketLimiter;
use super::limiter::{RateLimiter, StrategyKind};
use super::sliding_counter::SlidingWindowCounterLimiter;
use super::sliding_log::SlidingWindowLogLimiter;
use super::store::ClientKey;
use super::token_bucket::TokenBucketLimiter;
use crate::error::{positive, positive_count, RatekeeperError, Result};

/// A fully parameterised limiter choice.
///
/// Deserializes from an internally tagged map, e.g.
///
/// ```yaml
/// kind: token
/// capacity: 5
/// rate: 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LimiterSpec {
    Fixed {
        max_requests: u64,
        window_secs: f64,
        #[serde(default)]
        resolution: Resolution,
    },
    #[serde(alias = "sliding")]
    SlidingLog {
        max_requests: u64,
        window_secs: f64,
        #[serde(default)]
        resolution: Resolution,
    },
    SlidingCounter {
        max_requests: u64,
        window_secs: f64,
        #[serde(default)]
        resolution: Resolution,
    },
    Leaky {
        capacity: f64,
        leak_rate: f64,
    },
    Token {
        capacity: f64,
        rate: f64,
    },
}

impl LimiterSpec {
    /// Build a spec from a strategy tag and its two numeric parameters.
    ///
    /// For the window strategies `limit` is the request quota and
    /// `window_or_rate` the window in seconds. For the buckets `limit` is the
    /// capacity and `window_or_rate` the leak or refill rate per second.
    pub fn from_params(kind: &str, limit: f64, window_or_rate: f64) -> Result<Self> {
        let kind: StrategyKind = kind.parse()?;

        if kind.is_windowed() {
            let max_requests = positive_count("max_requests", limit)?;
            let window_secs = positive("window", window_or_rate)?;
            let resolution = Resolution::default().for_window(window_secs);
            return Ok(match kind {
                StrategyKind::Fixed => LimiterSpec::Fixed {
                    max_requests,
                    window_secs,
                    resolution,
                },
                StrategyKind::SlidingLog => LimiterSpec::SlidingLog {
                    max_requests,
                    window_secs,
                    resolution,
                },
                _ => LimiterSpec::SlidingCounter {
                    max_requests,
                    window_secs,
                    resolution,
                },
            });
        }

        let capacity = positive("capacity", limit)?;
        Ok(match kind {
            StrategyKind::Leaky => LimiterSpec::Leaky {
                capacity,
                leak_rate: positive("leak_rate", window_or_rate)?,
            },
            _ => LimiterSpec::Token {
                capacity,
                rate: positive("rate", window_or_rate)?,
            },
        })
    }

    /// Which strategy this spec selects.
    pub fn kind(&self) -> StrategyKind {
        match self {
            LimiterSpec::Fixed { .. } => StrategyKind::Fixed,
            LimiterSpec::SlidingLog { .. } => StrategyKind::SlidingLog,
            LimiterSpec::SlidingCounter { .. } => StrategyKind::SlidingCounter,
            LimiterSpec::Leaky { .. } => StrategyKind::Leaky,
            LimiterSpec::Token { .. } => StrategyKind::Token,
        }
    }
}

impl Default for LimiterSpec {
    fn default() -> Self {
        LimiterSpec::Fixed {
            max_requests: 100,
            window_secs: 60.0,
            resolution: Resolution::default(),
        }
    }
}

fn window(secs: f64) -> Result<Duration> {
    let secs = positive("window", secs)?;
    Duration::try_from_secs_f64(secs).map_err(|_| RatekeeperError::InvalidParameter {
        name: "window",
        value: secs,
        reason: "out of range",
    })
}

/// Builds limiters that share one clock.
#[derive(Debug, Clone)]
pub struct LimiterFactory {
    clock: Arc<dyn Clock>,
}

impl LimiterFactory {
    /// Create a factory whose limiters run on a fresh [`MonotonicClock`].
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Create a factory whose limiters run on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Create a limiter from a strategy tag.
    ///
    /// Fails with [`RatekeeperError::UnsupportedStrategy`] for an unknown tag
    /// and [`RatekeeperError::InvalidParameter`] for a non-positive parameter.
    pub fn create<K: ClientKey>(
        &self,
        kind: &str,
        limit: f64,
        window_or_rate: f64,
    ) -> Result<Box<dyn RateLimiter<K>>> {
        self.build(&LimiterSpec::from_params(kind, limit, window_or_rate)?)
    }

    /// Create a limiter from a typed spec.
    pub fn build<K: ClientKey>(&self, spec: &LimiterSpec) -> Result<Box<dyn RateLimiter<K>>> {
        let clock = self.clock.clone();

        let limiter: Box<dyn RateLimiter<K>> = match *spec {
            LimiterSpec::Fixed {
                max_requests,
                window_secs,
                resolution,
            } => Box::new(
                FixedWindowLimiter::<K>::with_clock(max_requests, window(window_secs)?, clock)?
                    .with_resolution(resolution),
            ),
            LimiterSpec::SlidingLog {
                max_requests,
                window_secs,
                resolution,
            } => Box::new(
                SlidingWindowLogLimiter::<K>::with_clock(max_requests, window(window_secs)?, clock)?
                    .with_resolution(resolution),
            ),
            LimiterSpec::SlidingCounter {
                max_requests,
                window_secs,
                resolution,
            } => Box::new(
                SlidingWindowCounterLimiter::<K>::with_clock(max_requests, window(window_secs)?, clock)?
                    .with_resolution(resolution),
            ),
            LimiterSpec::Leaky {
                capacity,
                leak_rate,
            } => Box::new(LeakyBucketLimiter::<K>::with_clock(capacity, leak_rate, clock)?),
            LimiterSpec::Token { capacity, rate } => {
                Box::new(TokenBucketLimiter::<K>::with_clock(capacity, rate, clock)?)
            }
        };

        info!(kind = %spec.kind(), spec = ?spec, "Rate limiter created");
        Ok(limiter)
    }
}

impl Default for LimiterFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::clock::ManualClock;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn test_create_every_kind() {
        let factory = LimiterFactory::new();
        for kind in StrategyKind::ALL {
            let limiter = assert_ok!(factory.create::<String>(kind.as_str(), 5.0, 5.0));
            assert_eq!(limiter.kind(), kind);
            assert!(limiter.allow(&"client".to_string()));
        }
    }

    #[test]
    fn test_unsupported_strategy() {
        let factory = LimiterFactory::new();
        let err = assert_err!(factory.create::<String>("bogus", 5.0, 5.0).map(|l| l.kind()));
        assert!(matches!(err, RatekeeperError::UnsupportedStrategy(tag) if tag == "bogus"));
    }

    #[test]
    fn test_invalid_parameters() {
        let factory = LimiterFactory::new();

        let err = assert_err!(factory.create::<String>("fixed", 0.0, 5.0).map(|l| l.kind()));
        assert!(matches!(
            err,
            RatekeeperError::InvalidParameter { name: "max_requests", .. }
        ));

        let err = assert_err!(factory.create::<String>("token", 5.0, -1.0).map(|l| l.kind()));
        assert!(matches!(err, RatekeeperError::InvalidParameter { name: "rate", .. }));

        let err = assert_err!(factory.create::<String>("leaky", 5.0, 0.0).map(|l| l.kind()));
        assert!(matches!(err, RatekeeperError::InvalidParameter { name: "leak_rate", .. }));

        let err = assert_err!(factory.create::<String>("sliding_counter", 2.5, 1.0).map(|l| l.kind()));
        assert!(matches!(err, RatekeeperError::InvalidParameter { name: "max_requests", .. }));

        assert_err!(factory.create::<String>("sliding_log", 5.0, f64::INFINITY).map(|l| l.kind()));
    }

    #[test]
    fn test_fractional_bucket_parameters_accepted() {
        let factory = LimiterFactory::new();
        assert_ok!(factory.create::<u64>("leaky", 2.5, 0.25));
        assert_ok!(factory.create::<u64>("fixed", 3.0, 0.5));
    }

    #[test]
    fn test_sub_second_window_honoured() {
        for kind in ["fixed", "sliding_log", "sliding_counter"] {
            let clock = ManualClock::new();
            let factory = LimiterFactory::with_clock(Arc::new(clock.clone()));
            let limiter = factory.create::<&str>(kind, 1.0, 0.5).unwrap();

            assert!(limiter.allow(&"client"), "{} rejected first request", kind);
            assert!(!limiter.allow(&"client"), "{} admitted over quota", kind);
            clock.advance(Duration::from_millis(600));
            assert!(limiter.allow(&"client"), "{} stretched a 0.5s window", kind);
        }
    }

    #[test]
    fn test_non_integer_window_honoured() {
        for kind in ["fixed", "sliding_log"] {
            let clock = ManualClock::new();
            let factory = LimiterFactory::with_clock(Arc::new(clock.clone()));
            let limiter = factory.create::<&str>(kind, 1.0, 1.5).unwrap();

            assert!(limiter.allow(&"client"));
            clock.advance(Duration::from_millis(1400));
            assert!(!limiter.allow(&"client"), "{} shrank a 1.5s window", kind);
            clock.advance(Duration::from_millis(200));
            assert!(limiter.allow(&"client"), "{} stretched a 1.5s window", kind);
        }
    }

    #[test]
    fn test_from_params_non_integer_window_is_fractional() {
        assert_eq!(
            LimiterSpec::from_params("sliding_counter", 3.0, 1.5).unwrap(),
            LimiterSpec::SlidingCounter {
                max_requests: 3,
                window_secs: 1.5,
                resolution: Resolution::Fractional,
            }
        );
    }

    #[test]
    fn test_build_overrides_whole_seconds_for_non_integer_window() {
        let clock = ManualClock::new();
        let factory = LimiterFactory::with_clock(Arc::new(clock.clone()));
        let spec = LimiterSpec::Fixed {
            max_requests: 1,
            window_secs: 0.5,
            resolution: Resolution::WholeSeconds,
        };
        let limiter = factory.build::<&str>(&spec).unwrap();

        assert!(limiter.allow(&"client"));
        clock.advance(Duration::from_millis(500));
        assert!(limiter.allow(&"client"));
    }

    #[test]
    fn test_from_params_maps_arguments() {
        assert_eq!(
            LimiterSpec::from_params("token", 5.0, 1.0).unwrap(),
            LimiterSpec::Token {
                capacity: 5.0,
                rate: 1.0
            }
        );
        assert_eq!(
            LimiterSpec::from_params("sliding", 10.0, 60.0).unwrap(),
            LimiterSpec::SlidingLog {
                max_requests: 10,
                window_secs: 60.0,
                resolution: Resolution::WholeSeconds,
            }
        );
    }

    #[test]
    fn test_build_rejects_invalid_spec() {
        let factory = LimiterFactory::new();
        let spec = LimiterSpec::Fixed {
            max_requests: 0,
            window_secs: 1.0,
            resolution: Resolution::Fractional,
        };
        assert_err!(factory.build::<String>(&spec).map(|l| l.kind()));
    }

    #[test]
    fn test_factory_shares_clock() {
        let clock = ManualClock::new();
        let factory = LimiterFactory::with_clock(Arc::new(clock.clone()));
        let limiter = factory.create::<&str>("fixed", 1.0, 10.0).unwrap();

        assert!(limiter.allow(&"client"));
        assert!(!limiter.allow(&"client"));
        clock.advance(Duration::from_secs(10));
        assert!(limiter.allow(&"client"));
    }

    #[test]
    fn test_spec_yaml_tags() {
        let spec: LimiterSpec = serde_yaml::from_str("kind: leaky\ncapacity: 5\nleak_rate: 1\n").unwrap();
        assert_eq!(
            spec,
            LimiterSpec::Leaky {
                capacity: 5.0,
                leak_rate: 1.0
            }
        );

        let spec: LimiterSpec =
            serde_yaml::from_str("kind: sliding_counter\nmax_requests: 5\nwindow_secs: 5\nresolution: fractional\n")
                .unwrap();
        assert_eq!(spec.kind(), StrategyKind::SlidingCounter);

        assert!(serde_yaml::from_str::<LimiterSpec>("kind: bogus\n").is_err());
    }
}
