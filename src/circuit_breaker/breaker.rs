//! Circuit breaker implementation.

use crate::circuit_breaker::config::{CircuitBreakerConfig, Fallback, DEFAULT_RECOVERY_TIMEOUT};
use crate::circuit_breaker::state::{BreakerMetrics, CircuitState, StoredState};
use crate::core::{
    BreakerError, BreakerStatus, CircuitOpen, Clock, ConfigResult, FailurePredicate,
};

use chrono::{DateTime, Utc};
use std::fmt;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// A circuit breaker guarding one fallible asynchronous operation.
///
/// The breaker counts consecutive qualifying failures. Once the count
/// reaches the threshold the circuit opens: calls are answered by the
/// fallback, or rejected with [`CircuitOpen`], without invoking the
/// operation. After the recovery timeout every call is let through as a
/// trial; a successful trial closes the circuit, a failed one re-opens it
/// from that moment.
///
/// Cloning a breaker is cheap and every clone shares the same state, so
/// one breaker serves all concurrent callers of its operation.
///
/// # Concurrency
///
/// The "is it open" check and the outcome update are separate critical
/// sections and no lock is held while the operation runs. There is no
/// single-trial gate: once the timeout elapses, every caller that arrives
/// before a trial completes runs its own trial, and each outcome updates
/// the shared state independently.
///
/// # Example
///
/// ```rust
/// use circuit_guard::{BreakerError, CircuitBreakerConfig, CircuitState};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// # futures::executor::block_on(async {
/// let breaker = CircuitBreakerConfig::<(), &str, String>::new()
///     .with_name("quotes")
///     .with_failure_threshold(1)
///     .build()?;
///
/// let result = breaker.call(|| async { Err::<&str, _>("refused".to_string()) }).await;
/// assert!(matches!(result, Err(BreakerError::Inner(_))));
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// let result = breaker.call(|| async { Ok::<_, String>("quote") }).await;
/// assert!(matches!(result, Err(BreakerError::Open(_))));
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # })
/// # }
/// ```
pub struct CircuitBreaker<A, T, E> {
    core: Arc<BreakerCore<E>>,
    fallback: Option<Fallback<A, T, E>>,
}

struct BreakerCore<E> {
    name: String,
    failure_threshold: u32,
    recovery_timeout: Duration,
    recovery_delta: chrono::Duration,
    predicate: Arc<dyn FailurePredicate<E>>,
    clock: Arc<dyn Clock>,
    state: RwLock<CircuitData<E>>,
    metrics: RwLock<BreakerMetrics>,
}

struct CircuitData<E> {
    stored: StoredState,
    failure_count: u32,
    opened_at: DateTime<Utc>,
    last_failure: Option<E>,
}

impl<E> CircuitData<E> {
    fn closed(now: DateTime<Utc>) -> Self {
        Self {
            stored: StoredState::Closed,
            failure_count: 0,
            opened_at: now,
            last_failure: None,
        }
    }
}

impl<E> BreakerCore<E> {
    fn read(&self) -> RwLockReadGuard<'_, CircuitData<E>> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CircuitData<E>> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn metrics_mut(&self) -> RwLockWriteGuard<'_, BreakerMetrics> {
        self.metrics
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_until_from(&self, opened_at: DateTime<Utc>) -> DateTime<Utc> {
        opened_at
            .checked_add_signed(self.recovery_delta)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    fn observed(&self, data: &CircuitData<E>, now: DateTime<Utc>) -> CircuitState {
        match data.stored {
            StoredState::Closed => CircuitState::Closed,
            StoredState::Open if now >= self.open_until_from(data.opened_at) => {
                CircuitState::HalfOpen
            }
            StoredState::Open => CircuitState::Open,
        }
    }

    fn current_state(&self) -> CircuitState {
        let now = self.clock.now();
        self.observed(&self.read(), now)
    }

    fn reopen_at(&self) -> DateTime<Utc> {
        self.open_until_from(self.read().opened_at)
    }

    fn remaining_secs(&self) -> f64 {
        let remaining = self.reopen_at() - self.clock.now();
        remaining.num_milliseconds() as f64 / 1_000.0
    }

    /// Applies a non-failure outcome: close, reset the count, forget the last failure.
    fn record_success(&self) {
        self.close_after_outcome(false);
    }

    /// An error the predicate rejected. Handed back to the caller, but
    /// recorded like a success.
    fn record_ignored_error(&self, error: &E)
    where
        E: Debug,
    {
        tracing::debug!(breaker = %self.name, error = ?error, "Error does not count as a failure");
        self.close_after_outcome(true);
    }

    fn close_after_outcome(&self, ignored_error: bool) {
        let mut data = self.write();
        let was_open = data.stored == StoredState::Open;
        data.stored = StoredState::Closed;
        data.failure_count = 0;
        data.last_failure = None;

        let mut metrics = self.metrics_mut();
        if ignored_error {
            metrics.record_ignored_error();
        } else {
            metrics.record_success();
        }
        if was_open {
            metrics.record_closed();
            tracing::info!(breaker = %self.name, "Circuit closed after successful trial call");
        }
    }

    /// Counts a qualifying failure and opens the circuit once the threshold is
    /// reached. A failure while stored open always re-opens from now, even
    /// if the count is below the threshold after a forced open.
    fn record_failure(&self, error: E) {
        let mut data = self.write();
        data.failure_count = data.failure_count.saturating_add(1);
        data.last_failure = Some(error);

        let mut metrics = self.metrics_mut();
        metrics.record_failure();

        let was_open = data.stored == StoredState::Open;
        if was_open || data.failure_count >= self.failure_threshold {
            data.stored = StoredState::Open;
            data.opened_at = self.clock.now();
            metrics.record_opened();
            tracing::warn!(
                breaker = %self.name,
                failure_count = data.failure_count,
                recovery_timeout = ?self.recovery_timeout,
                reopened = was_open,
                "Circuit breaker opened due to failures"
            );
        }
    }
}

impl<E> BreakerStatus for BreakerCore<E>
where
    E: Debug + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> CircuitState {
        self.current_state()
    }

    fn failure_count(&self) -> u32 {
        self.read().failure_count
    }

    fn open_until(&self) -> DateTime<Utc> {
        self.reopen_at()
    }

    fn open_remaining(&self) -> f64 {
        self.remaining_secs()
    }

    fn last_failure_debug(&self) -> Option<String> {
        self.read().last_failure.as_ref().map(|e| format!("{e:?}"))
    }
}

impl<E> Debug for BreakerCore<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.read();
        f.debug_struct("BreakerCore")
            .field("name", &self.name)
            .field("state", &self.observed(&data, self.clock.now()))
            .field("failure_count", &data.failure_count)
            .field("opened_at", &data.opened_at)
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .finish()
    }
}

impl<A, T, E> CircuitBreaker<A, T, E>
where
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Creates a breaker from `config`.
    ///
    /// The breaker starts closed with `opened_at` set to the creation time.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`](crate::core::ConfigError) if the
    /// configuration does not validate.
    pub fn new(config: CircuitBreakerConfig<A, T, E>) -> ConfigResult<Self> {
        config.validate()?;
        let recovery_delta = config.recovery_delta()?;
        Ok(Self::assemble(config, recovery_delta))
    }

    /// Creates a breaker with default configuration.
    pub fn with_defaults() -> Self {
        let recovery_delta = chrono::Duration::seconds(DEFAULT_RECOVERY_TIMEOUT.as_secs() as i64);
        Self::assemble(CircuitBreakerConfig::default(), recovery_delta)
    }

    fn assemble(config: CircuitBreakerConfig<A, T, E>, recovery_delta: chrono::Duration) -> Self {
        let now = config.clock.now();
        let core = BreakerCore {
            name: config.name,
            failure_threshold: config.failure_threshold,
            recovery_timeout: config.recovery_timeout,
            recovery_delta,
            predicate: config.predicate,
            clock: config.clock,
            state: RwLock::new(CircuitData::closed(now)),
            metrics: RwLock::new(BreakerMetrics::new()),
        };

        Self {
            core: Arc::new(core),
            fallback: config.fallback,
        }
    }

    /// Returns the observed phase.
    pub fn state(&self) -> CircuitState {
        self.core.current_state()
    }

    /// Returns `true` if a call made now would be blocked.
    ///
    /// This is `false` once the recovery timeout has elapsed, even though
    /// [`state`](Self::state) then reports [`CircuitState::HalfOpen`].
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Returns `true` if the stored phase is closed.
    ///
    /// A half-open breaker is not closed.
    pub fn is_closed(&self) -> bool {
        self.core.read().stored == StoredState::Closed
    }

    /// Consecutive qualifying failures since the last reset.
    pub fn failure_count(&self) -> u32 {
        self.core.read().failure_count
    }

    /// When the circuit last opened (creation time if it never has).
    pub fn opened_at(&self) -> DateTime<Utc> {
        self.core.read().opened_at
    }

    /// When the circuit will allow the next trial call.
    pub fn open_until(&self) -> DateTime<Utc> {
        self.core.reopen_at()
    }

    /// Seconds until a trial call is allowed. Negative once eligible.
    pub fn open_remaining(&self) -> f64 {
        self.core.remaining_secs()
    }

    /// The last qualifying failure, cleared by any non-failure outcome.
    pub fn last_failure(&self) -> Option<E> {
        self.core.read().last_failure.clone()
    }

    /// The configured name.
    pub fn name(&self) -> &str {
        &self.core.name
    }

    /// The configured fallback.
    pub fn fallback(&self) -> Option<&Fallback<A, T, E>> {
        self.fallback.as_ref()
    }

    /// The configured failure threshold.
    pub fn failure_threshold(&self) -> u32 {
        self.core.failure_threshold
    }

    /// The configured recovery timeout.
    pub fn recovery_timeout(&self) -> Duration {
        self.core.recovery_timeout
    }

    /// Returns a copy of the current metrics.
    pub fn metrics(&self) -> BreakerMetrics {
        self.core
            .metrics
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Forces the circuit open, starting a fresh recovery timeout.
    pub fn force_open(&self) {
        let mut data = self.core.write();
        data.stored = StoredState::Open;
        data.opened_at = self.core.clock.now();
        self.core.metrics_mut().record_opened();
        tracing::warn!(breaker = %self.core.name, "Circuit breaker forced open");
    }

    /// Forces the circuit closed, clearing the failure count and last failure.
    pub fn force_close(&self) {
        let mut data = self.core.write();
        let was_open = data.stored == StoredState::Open;
        data.stored = StoredState::Closed;
        data.failure_count = 0;
        data.last_failure = None;
        if was_open {
            self.core.metrics_mut().record_closed();
            tracing::info!(breaker = %self.core.name, "Circuit breaker forced closed");
        }
    }

    /// Resets the breaker to its initial state and clears metrics.
    pub fn reset(&self) {
        *self.core.write() = CircuitData::closed(self.core.clock.now());
        *self.core.metrics_mut() = BreakerMetrics::new();
    }

    /// Runs `operation` through the breaker, without fallback dispatch.
    ///
    /// If the circuit is open the operation is not invoked and
    /// [`BreakerError::Open`] is returned. Otherwise the operation's outcome
    /// is recorded and handed back unchanged.
    ///
    /// If the returned future is dropped before the operation completes,
    /// nothing is recorded.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Open`] if the circuit is open.
    /// - [`BreakerError::Inner`] with the operation's own error.
    pub async fn call<F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if self.is_open() {
            return Err(self.reject());
        }
        self.run(operation).await
    }

    /// Wraps `operation` so that every call goes through this breaker.
    pub fn guard<F, Fut>(&self, operation: F) -> Guarded<F, A, T, E>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Guarded {
            breaker: self.clone(),
            operation,
        }
    }

    /// Builds a breaker-open error bound to this breaker's live state.
    pub fn open_error(&self) -> CircuitOpen {
        let status: Arc<dyn BreakerStatus> = self.core.clone();
        CircuitOpen::new(status)
    }

    fn reject(&self) -> BreakerError<E> {
        self.core.metrics_mut().record_rejected();
        tracing::debug!(
            breaker = %self.core.name,
            failure_count = self.failure_count(),
            "Circuit open, call rejected"
        );
        BreakerError::Open(self.open_error())
    }

    async fn run<F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match operation().await {
            Ok(value) => {
                self.core.record_success();
                Ok(value)
            }
            Err(error) => {
                if self.core.predicate.is_failure(&error) {
                    self.core.record_failure(error.clone());
                } else {
                    self.core.record_ignored_error(&error);
                }
                Err(BreakerError::Inner(error))
            }
        }
    }
}

impl<A, T, E> Clone for CircuitBreaker<A, T, E> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            fallback: self.fallback.clone(),
        }
    }
}

impl<A, T, E> Debug for CircuitBreaker<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("core", &self.core)
            .field("fallback", &self.fallback)
            .finish()
    }
}

/// An operation wrapped by a [`CircuitBreaker`].
///
/// Created by [`CircuitBreaker::guard`]. Calling it checks the breaker
/// first: while open, the fallback answers (or the call is rejected);
/// otherwise the operation runs and its outcome updates the breaker.
pub struct Guarded<F, A, T, E> {
    breaker: CircuitBreaker<A, T, E>,
    operation: F,
}

impl<F, Fut, A, T, E> Guarded<F, A, T, E>
where
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Calls the guarded operation with `args`.
    ///
    /// # Errors
    ///
    /// - [`BreakerError::Open`] if the circuit is open and there is no fallback.
    /// - [`BreakerError::Inner`] with the operation's error, or with the
    ///   fallback's error when the fallback answered.
    pub async fn call(&self, args: A) -> Result<T, BreakerError<E>> {
        if self.breaker.is_open() {
            if let Some(fallback) = self.breaker.fallback() {
                self.breaker.core.metrics_mut().record_fallback();
                tracing::debug!(
                    breaker = %self.breaker.core.name,
                    asynchronous = fallback.is_async(),
                    "Circuit open, answering with fallback"
                );
                return fallback.invoke(args).await.map_err(BreakerError::Inner);
            }
            return Err(self.breaker.reject());
        }
        self.breaker.run(|| (self.operation)(args)).await
    }

    /// The breaker shared by every call of this operation.
    pub fn breaker(&self) -> &CircuitBreaker<A, T, E> {
        &self.breaker
    }
}

impl<F: Clone, A, T, E> Clone for Guarded<F, A, T, E> {
    fn clone(&self) -> Self {
        Self {
            breaker: self.breaker.clone(),
            operation: self.operation.clone(),
        }
    }
}

impl<F, A, T, E> Debug for Guarded<F, A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guarded")
            .field("breaker", &self.breaker)
            .finish_non_exhaustive()
    }
}
