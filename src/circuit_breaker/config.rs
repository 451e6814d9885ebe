//! Circuit breaker configuration.

use crate::circuit_breaker::breaker::{CircuitBreaker, Guarded};
use crate::core::{AnyError, Clock, ConfigError, ConfigResult, FailurePredicate, SystemClock};

use futures::future::BoxFuture;
use std::fmt;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Default number of consecutive failures before the circuit opens.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time the circuit stays open before allowing a trial call.
pub const DEFAULT_RECOVERY_TIMEOUT: Duration = Duration::from_secs(30);

type SyncFallbackFn<A, T, E> = dyn Fn(A) -> Result<T, E> + Send + Sync;
type AsyncFallbackFn<A, T, E> = dyn Fn(A) -> BoxFuture<'static, Result<T, E>> + Send + Sync;

/// An alternate operation answered in place of the guarded one while the
/// circuit is open.
///
/// Whether the fallback is synchronous or asynchronous is fixed when it is
/// constructed. The fallback receives the same arguments as the guarded
/// operation, and its outcome (success or error) goes straight to the
/// caller without touching breaker state.
pub enum Fallback<A, T, E> {
    /// A plain function.
    Sync(Arc<SyncFallbackFn<A, T, E>>),
    /// A function returning a future, awaited before returning.
    Async(Arc<AsyncFallbackFn<A, T, E>>),
}

impl<A, T, E> Fallback<A, T, E>
where
    A: 'static,
    T: 'static,
    E: 'static,
{
    /// Creates a synchronous fallback.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(A) -> Result<T, E> + Send + Sync + 'static,
    {
        Self::Sync(Arc::new(f))
    }

    /// Creates an asynchronous fallback.
    pub fn asynchronous<F, Fut>(f: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        Self::Async(Arc::new(move |args: A| -> BoxFuture<'static, Result<T, E>> {
            Box::pin(f(args))
        }))
    }
}

impl<A, T, E> Fallback<A, T, E> {
    /// Returns `true` if this fallback is awaited.
    pub fn is_async(&self) -> bool {
        matches!(self, Self::Async(_))
    }

    /// Invokes the fallback with `args`.
    pub async fn invoke(&self, args: A) -> Result<T, E> {
        match self {
            Self::Sync(f) => f(args),
            Self::Async(f) => f(args).await,
        }
    }
}

impl<A, T, E> Clone for Fallback<A, T, E> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

impl<A, T, E> Debug for Fallback<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Fallback::Sync(..)"),
            Self::Async(_) => f.write_str("Fallback::Async(..)"),
        }
    }
}

/// Configuration for a circuit breaker.
///
/// `A` is the argument type of the guarded operation (use a tuple for
/// several arguments), `T` its success type and `E` its error type.
///
/// ```rust
/// use circuit_guard::CircuitBreakerConfig;
/// use std::time::Duration;
///
/// let config = CircuitBreakerConfig::<u32, String, std::io::Error>::new()
///     .with_name("inventory")
///     .with_failure_threshold(3)
///     .with_recovery_timeout(Duration::from_secs(10));
///
/// assert!(config.validate().is_ok());
/// ```
pub struct CircuitBreakerConfig<A, T, E> {
    /// Number of consecutive qualifying failures before opening the circuit.
    pub failure_threshold: u32,

    /// How long the circuit blocks after opening before allowing a trial call.
    pub recovery_timeout: Duration,

    /// Label used in logs and breaker-open errors.
    pub name: String,

    /// Which errors count toward the threshold.
    pub(crate) predicate: Arc<dyn FailurePredicate<E>>,

    /// What to answer while open, if anything.
    pub(crate) fallback: Option<Fallback<A, T, E>>,

    pub(crate) clock: Arc<dyn Clock>,
}

impl<A, T, E> Default for CircuitBreakerConfig<A, T, E> {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            recovery_timeout: DEFAULT_RECOVERY_TIMEOUT,
            name: String::new(),
            predicate: Arc::new(AnyError),
            fallback: None,
            clock: Arc::new(SystemClock),
        }
    }
}

impl<A, T, E> CircuitBreakerConfig<A, T, E> {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the recovery timeout.
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets which errors count as failures.
    pub fn with_failure_predicate<P>(mut self, predicate: P) -> Self
    where
        P: FailurePredicate<E> + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    /// Sets the fallback answered while the circuit is open.
    pub fn with_fallback(mut self, fallback: Fallback<A, T, E>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Sets the time source.
    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Returns the configured fallback.
    pub fn fallback(&self) -> Option<&Fallback<A, T, E>> {
        self.fallback.as_ref()
    }

    /// Checks that the configuration can be used to build a breaker.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::InvalidThreshold`] if the threshold is zero.
    /// - [`ConfigError::InvalidTimeout`] if the recovery timeout is too large
    ///   to add to a timestamp.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::InvalidThreshold {
                threshold: self.failure_threshold,
            });
        }
        self.recovery_delta()?;
        Ok(())
    }

    pub(crate) fn recovery_delta(&self) -> ConfigResult<chrono::Duration> {
        chrono::Duration::from_std(self.recovery_timeout).map_err(|_| ConfigError::InvalidTimeout {
            timeout: self.recovery_timeout,
        })
    }
}

impl<A, T, E> CircuitBreakerConfig<A, T, E>
where
    E: Clone + Debug + Send + Sync + 'static,
{
    /// Builds a breaker from this configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if [`validate`](Self::validate) fails.
    pub fn build(self) -> ConfigResult<CircuitBreaker<A, T, E>> {
        CircuitBreaker::new(self)
    }

    /// Builds a breaker and wraps `operation` with it.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if [`validate`](Self::validate) fails.
    pub fn guard<F, Fut>(self, operation: F) -> ConfigResult<Guarded<F, A, T, E>>
    where
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Ok(self.build()?.guard(operation))
    }
}

impl<A, T, E> Debug for CircuitBreakerConfig<A, T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("recovery_timeout", &self.recovery_timeout)
            .field("name", &self.name)
            .field("fallback", &self.fallback)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Config = CircuitBreakerConfig<(), u32, String>;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(30));
        assert_eq!(config.name, "");
        assert!(config.fallback().is_none());
        assert!(config.predicate.is_failure(&"anything".to_string()));
    }

    #[test]
    fn test_config_builder() {
        let config = Config::new()
            .with_failure_threshold(10)
            .with_recovery_timeout(Duration::from_secs(60))
            .with_name("billing")
            .with_failure_predicate(|e: &String| e.starts_with("timeout"));

        assert_eq!(config.failure_threshold, 10);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.name, "billing");
        assert!(config.predicate.is_failure(&"timeout after 5s".to_string()));
        assert!(!config.predicate.is_failure(&"not found".to_string()));
    }

    #[test]
    fn test_validate_rejects_zero_threshold() {
        let config = Config::new().with_failure_threshold(0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { threshold: 0 })
        );
    }

    #[test]
    fn test_validate_accepts_zero_timeout() {
        let config = Config::new().with_recovery_timeout(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_huge_timeout() {
        let config = Config::new().with_recovery_timeout(Duration::MAX);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_fallback_variants() {
        let sync: Fallback<u32, u32, String> = Fallback::sync(|n: u32| Ok(n + 1));
        let asynchronous: Fallback<u32, u32, String> =
            Fallback::asynchronous(|n: u32| async move { Err(format!("no value for {n}")) });

        assert!(!sync.is_async());
        assert!(asynchronous.is_async());
        assert_eq!(sync.invoke(1).await, Ok(2));
        assert_eq!(asynchronous.invoke(7).await, Err("no value for 7".to_string()));
    }
}
