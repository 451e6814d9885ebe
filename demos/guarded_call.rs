//! Circuit breaker example demonstrating a guarded remote call.
//!
//! This example shows how to:
//! - Wrap an async operation with a circuit breaker
//! - Configure the failure threshold and recovery timeout
//! - Handle open circuit errors
//! - Answer from a fallback while the circuit is open
//!
//! Run with: cargo run --example guarded_call

use circuit_guard::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
#[error("upstream returned {status}")]
struct UpstreamError {
    status: u16,
}

/// Pretends to call a remote pricing service that fails on most requests.
async fn fetch_price(sku: String, attempt: u32) -> Result<u64, UpstreamError> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if attempt % 5 != 0 {
        return Err(UpstreamError { status: 503 });
    }
    Ok(sku.len() as u64 * 100)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Circuit Breaker Example ===\n");

    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let breaker = CircuitBreakerConfig::new()
        .with_name("pricing")
        .with_failure_threshold(3)
        .with_recovery_timeout(Duration::from_secs(2))
        .with_failure_predicate(|e: &UpstreamError| e.status >= 500)
        .build()?;

    println!("Circuit Breaker Configuration:");
    println!("  Failure threshold: {}", breaker.failure_threshold());
    println!("  Recovery timeout: {:?}", breaker.recovery_timeout());
    println!();

    let get_price = breaker.guard(move |sku: String| {
        let attempt = counter.fetch_add(1, Ordering::SeqCst) + 1;
        fetch_price(sku, attempt)
    });

    for i in 1..=6 {
        println!("Request #{}: circuit is {}", i, get_price.breaker().state());
        match get_price.call("sku-1234".to_string()).await {
            Ok(price) => println!("  price: {}", price),
            Err(BreakerError::Open(open)) => println!("  rejected: {}", open),
            Err(BreakerError::Inner(e)) => println!("  failed: {}", e),
        }
    }

    println!("\nWaiting for the recovery timeout...");
    tokio::time::sleep(Duration::from_secs(2)).await;
    println!("Circuit is now {}", get_price.breaker().state());

    match get_price.call("sku-1234".to_string()).await {
        Ok(price) => println!("  trial succeeded, price: {}", price),
        Err(e) => println!("  trial failed: {}", e),
    }
    println!("Circuit is now {}", get_price.breaker().state());
    println!("Metrics: {:?}", get_price.breaker().metrics());

    println!("\n=== Demonstrating Fallback ===\n");

    let cached = CircuitBreakerConfig::new()
        .with_name("pricing-with-cache")
        .with_failure_threshold(1)
        .with_fallback(Fallback::sync(|_sku: String| Ok(999)))
        .guard(|sku: String| fetch_price(sku, 1))?;

    for _ in 0..3 {
        match cached.call("sku-1234".to_string()).await {
            Ok(price) => println!("  price: {} (circuit {})", price, cached.breaker().state()),
            Err(e) => println!("  failed: {}", e),
        }
    }

    println!("\n=== Example Complete ===");
    Ok(())
}
