//! # circuit-guard
//!
//! An asynchronous circuit breaker: a guard placed in front of a fallible
//! async operation (typically a remote call) that counts consecutive
//! failures and, once a threshold is crossed, stops invoking the operation
//! for a cooldown period, failing fast or answering with a fallback.
//!
//! ## Quick Start
//!
//! ```rust
//! use circuit_guard::{circuit, BreakerError};
//!
//! #[derive(Debug, Clone)]
//! struct Refused;
//!
//! # futures::executor::block_on(async {
//! // Defaults: open after 5 consecutive failures, stay open for 30 seconds.
//! let fetch = circuit(|id: u32| async move {
//!     if id == 0 {
//!         return Err(Refused);
//!     }
//!     Ok(format!("record {id}"))
//! });
//!
//! assert_eq!(fetch.call(7).await.unwrap(), "record 7");
//! assert!(matches!(fetch.call(0).await, Err(BreakerError::Inner(Refused))));
//! assert_eq!(fetch.breaker().failure_count(), 1);
//! # });
//! ```
//!
//! ## Configured breakers
//!
//! Passing a [`CircuitBreakerConfig`] to [`circuit`] builds a breaker that
//! can then wrap an operation with [`CircuitBreaker::guard`]:
//!
//! ```rust
//! use circuit_guard::{circuit, CircuitBreakerConfig, Fallback};
//! use std::time::Duration;
//!
//! # fn example() -> Result<(), circuit_guard::ConfigError> {
//! let breaker = circuit(
//!     CircuitBreakerConfig::new()
//!         .with_name("catalog")
//!         .with_failure_threshold(3)
//!         .with_recovery_timeout(Duration::from_secs(10))
//!         .with_fallback(Fallback::sync(|_id: u32| Ok(String::from("cached")))),
//! )?;
//! let fetch = breaker.guard(|id: u32| async move { Ok::<_, String>(format!("record {id}")) });
//! # let _ = fetch;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **Core**: error types, failure classification, clocks
//! - **Circuit Breaker**: configuration, the state machine, and the
//!   [`Guarded`] wrapper

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod circuit_breaker;
pub mod core;

use std::fmt::Debug;
use std::future::Future;

// Re-export commonly used types at the crate root
pub use crate::core::{
    AnyError, BreakerError, CircuitOpen, Clock, ConfigError, FailurePredicate, ManualClock,
    SystemClock,
};

pub use crate::circuit_breaker::{
    BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitState, Fallback, Guarded,
};

/// Something [`circuit`] can turn into a breaker or a guarded operation.
///
/// Implemented for [`CircuitBreakerConfig`] (yielding a built breaker) and
/// for async operations `Fn(A) -> impl Future<Output = Result<T, E>>`
/// (yielding the operation wrapped by a default breaker).
pub trait IntoCircuit<A, T, E> {
    /// What [`circuit`] returns.
    type Output;

    /// Performs the conversion.
    fn into_circuit(self) -> Self::Output;
}

impl<A, T, E> IntoCircuit<A, T, E> for CircuitBreakerConfig<A, T, E>
where
    E: Clone + Debug + Send + Sync + 'static,
{
    type Output = crate::core::ConfigResult<CircuitBreaker<A, T, E>>;

    fn into_circuit(self) -> Self::Output {
        self.build()
    }
}

impl<F, Fut, A, T, E> IntoCircuit<A, T, E> for F
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Clone + Debug + Send + Sync + 'static,
{
    type Output = Guarded<F, A, T, E>;

    fn into_circuit(self) -> Self::Output {
        guard(self)
    }
}

/// Wraps an operation with a default breaker, or builds a breaker from a
/// configuration.
///
/// - `circuit(operation)` returns a [`Guarded`] operation using the
///   default settings (threshold 5, recovery timeout 30 seconds, every
///   error counts, no fallback).
/// - `circuit(config)` returns `Result<CircuitBreaker, ConfigError>`; the
///   breaker's [`guard`](CircuitBreaker::guard) then wraps an operation.
pub fn circuit<A, T, E, C>(arg: C) -> C::Output
where
    C: IntoCircuit<A, T, E>,
{
    arg.into_circuit()
}

/// Wraps `operation` with a breaker using default settings.
pub fn guard<F, Fut, A, T, E>(operation: F) -> Guarded<F, A, T, E>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Clone + Debug + Send + Sync + 'static,
{
    CircuitBreaker::with_defaults().guard(operation)
}

/// Prelude module for convenient imports.
///
/// ```rust
/// use circuit_guard::prelude::*;
/// ```
pub mod prelude {
    pub use crate::circuit_breaker::{
        BreakerMetrics, CircuitBreaker, CircuitBreakerConfig, CircuitState, Fallback, Guarded,
    };
    pub use crate::core::{AnyError, BreakerError, CircuitOpen, ConfigError, FailurePredicate};
    pub use crate::{circuit, guard};
}
