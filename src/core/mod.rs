//! Core types and traits for the circuit-guard library.
//!
//! - [`error`] - Breaker, pass-through and configuration errors
//! - [`traits`] - Failure classification and the live status view
//! - [`clock`] - Injectable time sources

pub mod clock;
pub mod error;
pub mod traits;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{BreakerError, CircuitOpen, ConfigError, ConfigResult};
pub use traits::{AnyError, BreakerStatus, FailurePredicate};
