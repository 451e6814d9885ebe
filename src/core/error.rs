//! Error types for the circuit-guard library.
//!
//! Three kinds of failure leave a guarded call:
//!
//! - the operation's own error, handed back unchanged as [`BreakerError::Inner`];
//! - [`CircuitOpen`], raised only when the breaker blocks a call and no
//!   fallback is configured;
//! - [`ConfigError`], raised while building a breaker, never at call time.

use crate::circuit_breaker::CircuitState;
use crate::core::traits::BreakerStatus;

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// The error returned by a call made through a circuit breaker.
///
/// Distinguishes "the breaker blocked this call" from "the call itself failed".
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open; the operation was not invoked.
    #[error(transparent)]
    Open(CircuitOpen),

    /// The operation ran and failed. The error is passed through unchanged.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns `true` if the breaker rejected the call.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Returns the operation's error, if this is one.
    pub fn inner(&self) -> Option<&E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }

    /// Consumes the error, returning the operation's error if this is one.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            Self::Open(_) => None,
        }
    }

    /// Returns the breaker-open error, if this is one.
    pub fn as_open(&self) -> Option<&CircuitOpen> {
        match self {
            Self::Open(open) => Some(open),
            Self::Inner(_) => None,
        }
    }
}

/// Raised when a call hits an open circuit and there is no fallback.
///
/// Holds a handle to the live breaker rather than a snapshot, so the rendered
/// message always reflects the breaker's current state.
#[derive(Clone)]
pub struct CircuitOpen {
    breaker: Arc<dyn BreakerStatus>,
}

impl CircuitOpen {
    pub(crate) fn new(breaker: Arc<dyn BreakerStatus>) -> Self {
        Self { breaker }
    }

    /// Name of the breaker that rejected the call.
    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    /// Current observed phase of the breaker.
    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// When the breaker will let the next trial call through.
    pub fn open_until(&self) -> DateTime<Utc> {
        self.breaker.open_until()
    }

    /// Current consecutive failure count.
    pub fn failure_count(&self) -> u32 {
        self.breaker.failure_count()
    }

    /// Seconds until a trial call is allowed. Negative once eligible.
    pub fn open_remaining(&self) -> f64 {
        self.breaker.open_remaining()
    }

    /// Debug rendering of the last qualifying failure, if any.
    pub fn last_failure(&self) -> Option<String> {
        self.breaker.last_failure_debug()
    }
}

impl fmt::Display for CircuitOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last_failure = self
            .breaker
            .last_failure_debug()
            .unwrap_or_else(|| "None".to_string());
        write!(
            f,
            "Circuit \"{}\" OPEN until {} ({} failures, {} sec remaining) (last_failure: {})",
            self.breaker.name(),
            self.breaker.open_until(),
            self.breaker.failure_count(),
            self.breaker.open_remaining().round() as i64,
            last_failure,
        )
    }
}

impl fmt::Debug for CircuitOpen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitOpen")
            .field("name", &self.breaker.name())
            .field("state", &self.breaker.state())
            .field("failure_count", &self.breaker.failure_count())
            .field("open_until", &self.breaker.open_until())
            .finish()
    }
}

impl std::error::Error for CircuitOpen {}

/// Error raised when a breaker is configured with unusable settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// The failure threshold must be at least one.
    #[error("failure threshold must be at least 1, got {threshold}")]
    InvalidThreshold {
        /// The rejected threshold.
        threshold: u32,
    },

    /// The recovery timeout does not fit in a calendar duration.
    #[error("recovery timeout {timeout:?} is out of range")]
    InvalidTimeout {
        /// The rejected timeout.
        timeout: Duration,
    },
}

/// A specialized `Result` type for breaker configuration.
pub type ConfigResult<T> = Result<T, ConfigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("remote refused: {0}")]
    struct Refused(&'static str);

    #[test]
    fn test_inner_error_is_transparent() {
        let err: BreakerError<Refused> = BreakerError::Inner(Refused("port 80"));
        assert_eq!(err.to_string(), "remote refused: port 80");
        assert!(!err.is_open());
        assert_eq!(err.inner(), Some(&Refused("port 80")));
        assert_eq!(err.into_inner(), Some(Refused("port 80")));
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidThreshold { threshold: 0 };
        assert_eq!(err.to_string(), "failure threshold must be at least 1, got 0");
    }
}
