//! Circuit breaker state machine and call interception.
//!
//! The circuit breaker pattern stops calling an operation that keeps
//! failing, answers with a fallback or fails fast for a cooldown period,
//! then lets calls through again as trials.
//!
//! ## States
//!
//! - **Closed**: Normal operation; calls pass through and qualifying
//!   failures are counted.
//! - **Open**: The failure threshold was reached; calls are blocked.
//! - **Half-Open**: Open, but the recovery timeout has elapsed. Never
//!   stored; every call in this phase runs as a trial.
//!
//! ## Usage
//!
//! ```rust
//! use circuit_guard::circuit_breaker::{CircuitBreakerConfig, Fallback};
//! use std::io;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! # futures::executor::block_on(async {
//! let lookup = CircuitBreakerConfig::new()
//!     .with_name("price-lookup")
//!     .with_failure_threshold(5)
//!     .with_recovery_timeout(Duration::from_secs(30))
//!     .with_fallback(Fallback::sync(|_sku: String| Ok(0u64)))
//!     .guard(|sku: String| async move {
//!         if sku.is_empty() {
//!             return Err(Arc::new(io::Error::from(io::ErrorKind::InvalidInput)));
//!         }
//!         Ok(42u64)
//!     })?;
//!
//! assert_eq!(lookup.call("sku-1".to_string()).await?, 42);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # })
//! # }
//! ```

mod breaker;
mod config;
mod state;

pub use breaker::{CircuitBreaker, Guarded};
pub use config::{
    CircuitBreakerConfig, Fallback, DEFAULT_FAILURE_THRESHOLD, DEFAULT_RECOVERY_TIMEOUT,
};
pub use state::{BreakerMetrics, CircuitState};
