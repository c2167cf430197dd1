//! The admission-control interface shared by every algorithm.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::RatekeeperError;

/// The five supported admission algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    /// Hard-reset counter per window
    Fixed,
    /// Exact log of admission timestamps
    SlidingLog,
    /// Counter bucketed by window index
    SlidingCounter,
    /// Constant-rate drain
    Leaky,
    /// Continuous refill of credits
    Token,
}

impl StrategyKind {
    /// All strategies, in declaration order.
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Fixed,
        StrategyKind::SlidingLog,
        StrategyKind::SlidingCounter,
        StrategyKind::Leaky,
        StrategyKind::Token,
    ];

    /// The configuration tag for this strategy.
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Fixed => "fixed",
            StrategyKind::SlidingLog => "sliding_log",
            StrategyKind::SlidingCounter => "sliding_counter",
            StrategyKind::Leaky => "leaky",
            StrategyKind::Token => "token",
        }
    }

    /// Whether this strategy counts whole requests per window.
    pub fn is_windowed(&self) -> bool {
        matches!(
            self,
            StrategyKind::Fixed | StrategyKind::SlidingLog | StrategyKind::SlidingCounter
        )
    }
}

impl FromStr for StrategyKind {
    type Err = RatekeeperError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        match tag {
            "fixed" => Ok(StrategyKind::Fixed),
            "sliding_log" | "sliding" => Ok(StrategyKind::SlidingLog),
            "sliding_counter" => Ok(StrategyKind::SlidingCounter),
            "leaky" => Ok(StrategyKind::Leaky),
            "token" => Ok(StrategyKind::Token),
            other => Err(RatekeeperError::UnsupportedStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A per-client admission policy.
///
/// Implementations are thread-safe and meant to be shared behind an `Arc`.
pub trait RateLimiter<K>: Send + Sync {
    /// Decide whether `client` may make one more request now.
    ///
    /// Never blocks beyond a short per-client critical section and never
    /// fails; an exhausted quota is reported as `false`.
    fn allow(&self, client: &K) -> bool;

    /// Which algorithm this limiter runs.
    fn kind(&self) -> StrategyKind;

    /// Number of clients with live state.
    fn tracked_clients(&self) -> usize;

    /// Drop state for clients not seen for at least `idle`.
    ///
    /// Returns the number of clients evicted.
    fn evict_idle(&self, idle: Duration) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_tag() {
        for kind in StrategyKind::ALL {
            assert_eq!(kind.as_str().parse::<StrategyKind>().unwrap(), kind);
            assert_eq!(kind.to_string(), kind.as_str());
        }
    }

    #[test]
    fn test_sliding_alias() {
        assert_eq!(
            "sliding".parse::<StrategyKind>().unwrap(),
            StrategyKind::SlidingLog
        );
    }

    #[test]
    fn test_unknown_tag() {
        let err = "bogus".parse::<StrategyKind>().unwrap_err();
        assert!(matches!(err, RatekeeperError::UnsupportedStrategy(tag) if tag == "bogus"));
    }

    #[test]
    fn test_windowed_kinds() {
        assert!(StrategyKind::Fixed.is_windowed());
        assert!(StrategyKind::SlidingCounter.is_windowed());
        assert!(!StrategyKind::Token.is_windowed());
    }
}
