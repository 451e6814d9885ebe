//! End-to-end behavior of guarded operations against a simulated remote call.

use circuit_guard::prelude::*;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("connection refused")]
struct ConnectionRefused;

/// A fake remote endpoint that can be switched between healthy and failing.
#[derive(Debug, Default)]
struct Remote {
    failing: AtomicBool,
    calls: AtomicU32,
}

impl Remote {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call(&self) -> Result<bool, ConnectionRefused> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        if self.failing.load(Ordering::SeqCst) {
            Err(ConnectionRefused)
        } else {
            Ok(true)
        }
    }
}

fn guarded_remote(
    remote: &Arc<Remote>,
    config: CircuitBreakerConfig<(), bool, ConnectionRefused>,
) -> Guarded<
    impl Fn(()) -> futures::future::BoxFuture<'static, Result<bool, ConnectionRefused>>,
    (),
    bool,
    ConnectionRefused,
> {
    let remote = Arc::clone(remote);
    config
        .guard(move |_: ()| {
            let remote = Arc::clone(&remote);
            let call: futures::future::BoxFuture<'static, _> =
                Box::pin(async move { remote.call().await });
            call
        })
        .unwrap()
}

#[tokio::test]
async fn test_circuit_pass_through() {
    let remote = Remote::new();
    let guarded = guarded_remote(&remote, CircuitBreakerConfig::new());

    assert!(guarded.call(()).await.unwrap());
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_threshold_hit_prevents_consequent_calls() {
    let remote = Remote::new();
    remote.set_failing(true);
    let guarded = guarded_remote(
        &remote,
        CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_name("threshold_1"),
    );
    let breaker = guarded.breaker();

    assert!(breaker.is_closed());
    assert!(matches!(
        guarded.call(()).await,
        Err(BreakerError::Inner(ConnectionRefused))
    ));
    assert!(breaker.is_open());

    let err = guarded.call(()).await.unwrap_err();
    assert!(err.is_open());
    assert!(err.to_string().starts_with("Circuit \"threshold_1\" OPEN until "));
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_circuit_breaker_recover_half_open() {
    let remote = Remote::new();
    let guarded = guarded_remote(
        &remote,
        CircuitBreakerConfig::new()
            .with_failure_threshold(3)
            .with_recovery_timeout(Duration::from_secs(1))
            .with_name("threshold_3"),
    );
    let breaker = guarded.breaker();

    assert!(breaker.is_closed());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert!(guarded.call(()).await.unwrap());

    remote.set_failing(true);
    for expected in 1..=2 {
        assert!(matches!(
            guarded.call(()).await,
            Err(BreakerError::Inner(ConnectionRefused))
        ));
        assert!(breaker.is_closed());
        assert_eq!(breaker.failure_count(), expected);
    }

    assert!(matches!(
        guarded.call(()).await,
        Err(BreakerError::Inner(ConnectionRefused))
    ));
    assert!(breaker.is_open());
    assert_eq!(breaker.state(), CircuitState::Open);
    assert_eq!(breaker.failure_count(), 3);
    assert!(breaker.open_remaining() > 0.0 && breaker.open_remaining() <= 1.0);

    for _ in 0..2 {
        assert!(guarded.call(()).await.unwrap_err().is_open());
        assert!(breaker.is_open());
        assert_eq!(breaker.failure_count(), 3);
        assert!(breaker.open_remaining() > 0.0 && breaker.open_remaining() <= 1.0);
    }
    assert_eq!(remote.calls(), 4);

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!breaker.is_closed());
    assert!(breaker.open_remaining() <= 0.0);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    assert!(matches!(
        guarded.call(()).await,
        Err(BreakerError::Inner(ConnectionRefused))
    ));
    assert_eq!(remote.calls(), 5);
    assert!(breaker.is_open());
    assert_eq!(breaker.failure_count(), 4);
    assert!(breaker.open_remaining() > 0.0 && breaker.open_remaining() <= 1.0);

    assert!(guarded.call(()).await.unwrap_err().is_open());
}

#[tokio::test]
async fn test_circuit_breaker_closes_after_successful_trial() {
    let remote = Remote::new();
    let guarded = guarded_remote(
        &remote,
        CircuitBreakerConfig::new()
            .with_failure_threshold(2)
            .with_recovery_timeout(Duration::from_secs(1))
            .with_name("threshold_2"),
    );
    let breaker = guarded.breaker();

    assert!(guarded.call(()).await.unwrap());

    remote.set_failing(true);
    let _ = guarded.call(()).await;
    assert!(breaker.is_closed());
    assert_eq!(breaker.failure_count(), 1);
    let _ = guarded.call(()).await;
    assert!(breaker.is_open());
    assert_eq!(breaker.failure_count(), 2);

    // The remote recovers, but the timeout has not elapsed yet.
    remote.set_failing(false);
    assert!(guarded.call(()).await.unwrap_err().is_open());
    assert_eq!(breaker.failure_count(), 2);

    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!breaker.is_closed());
    assert_eq!(breaker.failure_count(), 2);
    assert_eq!(breaker.state(), CircuitState::HalfOpen);

    assert!(guarded.call(()).await.unwrap());
    assert!(breaker.is_closed());
    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(breaker.failure_count(), 0);

    for _ in 0..3 {
        assert!(guarded.call(()).await.unwrap());
    }
    assert_eq!(breaker.metrics().times_closed, 1);
}

#[tokio::test]
async fn test_zero_recovery_timeout_lets_next_call_through() {
    let remote = Remote::new();
    remote.set_failing(true);
    let guarded = guarded_remote(
        &remote,
        CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_recovery_timeout(Duration::ZERO),
    );

    let _ = guarded.call(()).await;
    assert_eq!(guarded.breaker().state(), CircuitState::HalfOpen);

    remote.set_failing(false);
    assert!(guarded.call(()).await.unwrap());
    assert_eq!(remote.calls(), 2);
    assert_eq!(guarded.breaker().state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_async_fallback_answers_while_open() {
    let remote = Remote::new();
    remote.set_failing(true);
    let fallback_calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fallback_calls);
    let guarded = guarded_remote(
        &remote,
        CircuitBreakerConfig::new()
            .with_failure_threshold(1)
            .with_fallback(Fallback::asynchronous(move |_: ()| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                }
            })),
    );

    let _ = guarded.call(()).await;
    assert!(guarded.breaker().is_open());

    assert!(!guarded.call(()).await.unwrap());
    assert!(!guarded.call(()).await.unwrap());
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 2);
    assert_eq!(remote.calls(), 1);
}

#[tokio::test]
async fn test_guard_with_defaults() {
    let remote = Remote::new();
    let handle = Arc::clone(&remote);
    let guarded = guard(move |_: ()| {
        let remote = Arc::clone(&handle);
        async move { remote.call().await }
    });

    remote.set_failing(true);
    for _ in 0..5 {
        let _ = guarded.call(()).await;
    }

    assert!(guarded.breaker().is_open());
    assert_eq!(guarded.breaker().failure_count(), 5);
    assert!(guarded.call(()).await.unwrap_err().is_open());
    assert_eq!(remote.calls(), 5);
}
