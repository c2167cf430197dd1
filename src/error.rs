//! Error types for ratekeeper.

use thiserror::Error;

/// Main error type for ratekeeper operations.
///
/// Only construction and configuration can fail. An exhausted quota is a
/// normal `false` from `allow`, never an error.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// The requested algorithm tag is not one of the known strategies
    #[error("Unsupported rate limiting strategy: {0:?}")]
    UnsupportedStrategy(String),

    /// A quota, window, rate or capacity parameter is out of range
    #[error("Invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;

/// Check that a rate, window or capacity is a finite positive number.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64> {
    if !value.is_finite() {
        return Err(RatekeeperError::InvalidParameter {
            name,
            value,
            reason: "must be finite",
        });
    }
    if value <= 0.0 {
        return Err(RatekeeperError::InvalidParameter {
            name,
            value,
            reason: "must be greater than zero",
        });
    }
    Ok(value)
}

/// Check that an integral quota is non-zero.
pub(crate) fn nonzero(name: &'static str, value: u64) -> Result<u64> {
    if value == 0 {
        return Err(RatekeeperError::InvalidParameter {
            name,
            value: 0.0,
            reason: "must be greater than zero",
        });
    }
    Ok(value)
}

/// Check that a window is a non-empty span of time.
pub(crate) fn nonzero_window(name: &'static str, window: std::time::Duration) -> Result<f64> {
    positive(name, window.as_secs_f64())
}

/// Check that a request quota is a positive whole number.
pub(crate) fn positive_count(name: &'static str, value: f64) -> Result<u64> {
    let value = positive(name, value)?;
    if value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(RatekeeperError::InvalidParameter {
            name,
            value,
            reason: "must be a whole number of requests",
        });
    }
    Ok(value as u64)
}
