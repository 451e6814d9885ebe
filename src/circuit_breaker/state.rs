//! Circuit breaker phases and counters.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The observed phase of a circuit breaker.
///
/// Only [`Closed`](Self::Closed) and [`Open`](Self::Open) are ever stored.
/// [`HalfOpen`](Self::HalfOpen) is what an open breaker reports once its
/// recovery timeout has elapsed: the next call goes through as a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through normally.
    Closed,
    /// Calls are blocked.
    Open,
    /// Open, but the recovery timeout has elapsed; calls pass through as trials.
    HalfOpen,
}

impl CircuitState {
    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    /// Returns `true` if calls in this phase are blocked.
    pub fn blocks(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The persisted phase. Half-open is derived, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum StoredState {
    #[default]
    Closed,
    Open,
}

/// In-process counters describing what a breaker has done.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerMetrics {
    /// Calls that reached the guarded operation and completed.
    pub total_calls: u64,
    /// Completed calls that were not qualifying failures.
    pub successful_calls: u64,
    /// Completed calls that ended in a qualifying failure.
    pub failed_calls: u64,
    /// Errors that did not qualify as failures (a subset of `successful_calls`).
    pub ignored_errors: u64,
    /// Calls rejected with a breaker-open error.
    pub rejected_calls: u64,
    /// Calls answered by the fallback while open.
    pub fallback_calls: u64,
    /// Number of times the circuit has opened (including re-opens after a failed trial).
    pub times_opened: u64,
    /// Number of times the circuit went from open to closed, by a trial call
    /// or [`force_close`](crate::CircuitBreaker::force_close).
    pub times_closed: u64,
}

impl BreakerMetrics {
    /// Creates new empty metrics.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_success(&mut self) {
        self.total_calls += 1;
        self.successful_calls += 1;
    }

    pub(crate) fn record_ignored_error(&mut self) {
        self.record_success();
        self.ignored_errors += 1;
    }

    pub(crate) fn record_failure(&mut self) {
        self.total_calls += 1;
        self.failed_calls += 1;
    }

    pub(crate) fn record_rejected(&mut self) {
        self.rejected_calls += 1;
    }

    pub(crate) fn record_fallback(&mut self) {
        self.fallback_calls += 1;
    }

    pub(crate) fn record_opened(&mut self) {
        self.times_opened += 1;
    }

    pub(crate) fn record_closed(&mut self) {
        self.times_closed += 1;
    }

    /// Fraction of completed calls that succeeded (0.0 to 1.0).
    pub fn success_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 1.0;
        }
        self.successful_calls as f64 / self.total_calls as f64
    }

    /// Fraction of completed calls that failed (0.0 to 1.0).
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            return 0.0;
        }
        self.failed_calls as f64 / self.total_calls as f64
    }
}
