//! Retry Integration Tests
//!
//! Tests for retry budgets, error classes and backoff configuration.

mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use lanepress::adapters::GenerationRequest;
use lanepress::core::{Backoff, CallError, RetryPolicy, RetryableCaller};

use common::FakeGenerator;

#[test]
fn test_policy_from_yaml() {
    let yaml = r#"
max_attempts: 5
initial_delay_ms: 1000
backoff: exponential
"#;

    let policy: RetryPolicy = serde_yaml::from_str(yaml).unwrap();

    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.malformed_max_attempts, 2);
    assert_eq!(policy.backoff, Backoff::Exponential);
    assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
    assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(4000));
}

#[test]
fn test_delivery_policy_is_linear() {
    let policy = RetryPolicy::delivery();

    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(5));
    assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(10));
}

#[tokio::test]
async fn test_transient_errors_use_full_budget() {
    let caller = RetryableCaller::new("test", RetryPolicy::immediate(3));
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = caller
        .call(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::Timeout("slow".to_string())) }
        })
        .await;

    let failure = result.unwrap_err();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.last_error, CallError::Timeout("slow".to_string()));
}

#[tokio::test]
async fn test_malformed_errors_use_smaller_budget() {
    let caller = RetryableCaller::new("test", RetryPolicy::immediate(3));
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = caller
        .call(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(CallError::Malformed {
                    status: 400,
                    body: "bad request".to_string(),
                })
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_fatal_error_is_not_retried() {
    let caller = RetryableCaller::new("test", RetryPolicy::immediate(3));
    let calls = AtomicU32::new(0);

    let result: Result<(), _> = caller
        .call(|_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::from_status(401, "bad key")) }
        })
        .await;

    assert_eq!(result.unwrap_err().attempts, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_success_after_transient_failure() {
    let caller = RetryableCaller::new("test", RetryPolicy::immediate(3));

    let result = caller
        .call(|attempt| async move {
            if attempt < 3 {
                Err(CallError::RateLimited { status: 429 })
            } else {
                Ok(attempt)
            }
        })
        .await;

    assert_eq!(result.unwrap(), 3);
}

#[tokio::test]
async fn test_blank_generation_is_retried() {
    let blank = FakeGenerator::new(|_| Ok("   \n".to_string()));
    let caller = RetryableCaller::new("generation", RetryPolicy::immediate(3));
    let request = GenerationRequest::new("Write a professional article", "gpt-5");

    let failure = caller.generate(blank.as_ref(), &request).await.unwrap_err();

    assert_eq!(blank.calls(), 3);
    assert!(matches!(failure.last_error, CallError::EmptyResponse(_)));
}
