//! Core traits for the circuit-guard library.
//!
//! - [`FailurePredicate`] decides which errors count toward the threshold.
//! - [`BreakerStatus`] is the read-only live view a [`CircuitOpen`] error
//!   renders itself from.
//!
//! [`CircuitOpen`]: crate::core::CircuitOpen

use crate::circuit_breaker::CircuitState;

use chrono::{DateTime, Utc};
use std::fmt::Debug;

/// Classifies errors returned by a guarded operation.
///
/// Only errors for which [`is_failure`](Self::is_failure) returns `true`
/// are *qualifying failures*: they are counted and may open the circuit.
/// Any other error is handed back to the caller but treated like a success
/// by the state machine.
///
/// Closures of type `Fn(&E) -> bool` implement this trait:
///
/// ```rust
/// use circuit_guard::core::FailurePredicate;
/// use std::io;
///
/// let timeouts_only = |e: &io::Error| e.kind() == io::ErrorKind::TimedOut;
/// assert!(timeouts_only.is_failure(&io::Error::from(io::ErrorKind::TimedOut)));
/// assert!(!timeouts_only.is_failure(&io::Error::from(io::ErrorKind::NotFound)));
/// ```
pub trait FailurePredicate<E>: Send + Sync {
    /// Returns `true` if `error` should count toward the failure threshold.
    fn is_failure(&self, error: &E) -> bool;
}

impl<E, F> FailurePredicate<E> for F
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn is_failure(&self, error: &E) -> bool {
        self(error)
    }
}

/// The default predicate: every error is a qualifying failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyError;

impl<E> FailurePredicate<E> for AnyError {
    fn is_failure(&self, _error: &E) -> bool {
        true
    }
}

/// Read-only, type-erased view of a breaker's live state.
pub trait BreakerStatus: Send + Sync + Debug {
    /// The configured name.
    fn name(&self) -> &str;

    /// The observed phase, computed at the time of the call.
    fn state(&self) -> CircuitState;

    /// Consecutive qualifying failures since the last reset.
    fn failure_count(&self) -> u32;

    /// When the most recent opening expires.
    fn open_until(&self) -> DateTime<Utc>;

    /// Seconds until `open_until`, negative once it has passed.
    fn open_remaining(&self) -> f64;

    /// Debug rendering of the last qualifying failure.
    fn last_failure_debug(&self) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_error_counts_everything() {
        assert!(FailurePredicate::<String>::is_failure(&AnyError, &"boom".to_string()));
        assert!(FailurePredicate::<u8>::is_failure(&AnyError, &0));
    }

    #[test]
    fn test_closure_predicate() {
        let only_large = |e: &u32| *e > 100;
        assert!(only_large.is_failure(&500));
        assert!(!only_large.is_failure(&42));
    }
}
