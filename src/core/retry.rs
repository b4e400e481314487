//! Bounded retries for outbound calls.
//!
//! Every upstream call (research, generation, delivery) goes through a
//! [`RetryableCaller`], which classifies failures, waits between attempts and
//! turns exhaustion into a typed [`CallFailure`] instead of an early return.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::adapters::{GenerationOutput, GenerationRequest, Generator};

/// Failure of a single outbound call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CallError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("rate limited (HTTP {status})")]
    RateLimited { status: u16 },

    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("upstream error (HTTP {status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("malformed request (HTTP {status}): {body}")]
    Malformed { status: u16, body: String },

    #[error("{0}")]
    Fatal(String),
}

/// How a failure should be treated by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Network trouble, throttling, 5xx, empty output
    Transient,

    /// 4xx request errors; upstreams return these spuriously, so a smaller budget applies
    Malformed,

    /// Configuration problems; retrying cannot help
    Fatal,
}

impl CallError {
    pub fn class(&self) -> ErrorClass {
        match self {
            CallError::Network(_)
            | CallError::Timeout(_)
            | CallError::RateLimited { .. }
            | CallError::EmptyResponse(_)
            | CallError::Upstream { .. } => ErrorClass::Transient,
            CallError::Malformed { .. } => ErrorClass::Malformed,
            CallError::Fatal(_) => ErrorClass::Fatal,
        }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            429 => CallError::RateLimited { status },
            401 | 403 => CallError::Fatal(format!("authentication rejected (HTTP {}): {}", status, body)),
            400..=499 => CallError::Malformed { status, body },
            _ => CallError::Upstream { status, body },
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CallError::Timeout(e.to_string())
        } else if e.is_builder() {
            CallError::Fatal(e.to_string())
        } else if let Some(status) = e.status() {
            CallError::from_status(status.as_u16(), e.to_string())
        } else {
            CallError::Network(e.to_string())
        }
    }
}

/// Terminal failure after the retry budget is spent
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{label} failed after {attempts} attempt(s): {last_error}")]
pub struct CallFailure {
    /// What was being called
    pub label: String,

    /// Attempts actually made
    pub attempts: u32,

    /// Error from the final attempt
    pub last_error: CallError,
}

/// Delay growth between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// `initial_delay × attempt`
    #[default]
    Linear,

    /// `initial_delay × multiplier^(attempt - 1)`
    Exponential,
}

/// Retry policy for outbound calls
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including first try)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Attempt budget for malformed-request errors
    #[serde(default = "default_malformed_max_attempts")]
    pub malformed_max_attempts: u32,

    /// Base delay between retries in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default)]
    pub backoff: Backoff,

    /// Only used with exponential backoff
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_malformed_max_attempts() -> u32 {
    2
}
fn default_initial_delay() -> u64 {
    2000
}
fn default_max_delay() -> u64 {
    60000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            malformed_max_attempts: default_malformed_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff: Backoff::default(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// Policy used for webhook delivery: 5s, 10s, 15s...
    pub fn delivery() -> Self {
        Self {
            initial_delay_ms: 5000,
            ..Default::default()
        }
    }

    /// Same attempt budget, no waiting. Handy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            malformed_max_attempts: max_attempts.min(default_malformed_max_attempts()),
            initial_delay_ms: 0,
            max_delay_ms: 0,
            ..Default::default()
        }
    }

    /// Calculate the delay after a failed attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        let delay = match self.backoff {
            Backoff::Linear => self.initial_delay_ms as f64 * attempt as f64,
            Backoff::Exponential => {
                self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32)
            }
        };

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if another attempt is allowed after `attempt` failed with `class`
    pub fn should_retry(&self, attempt: u32, class: ErrorClass) -> bool {
        match class {
            ErrorClass::Transient => attempt < self.max_attempts,
            ErrorClass::Malformed => attempt < self.malformed_max_attempts.min(self.max_attempts),
            ErrorClass::Fatal => false,
        }
    }
}

/// Wraps an outbound operation with the retry policy
#[derive(Debug, Clone)]
pub struct RetryableCaller {
    label: String,
    policy: RetryPolicy,
}

impl RetryableCaller {
    pub fn new(label: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            label: label.into(),
            policy,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Invoke `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the 1-indexed attempt number. Never panics or returns
    /// early on a retryable error.
    pub async fn call<T, F, Fut>(&self, mut op: F) -> Result<T, CallFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, CallError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(call = %self.label, attempt, "Calling upstream");

            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(call = %self.label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let class = e.class();
                    if self.policy.should_retry(attempt, class) {
                        let delay = self.policy.delay_for_attempt(attempt);
                        warn!(
                            call = %self.label,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Call failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    error!(
                        call = %self.label,
                        attempt,
                        error = %e,
                        "Call failed permanently"
                    );
                    return Err(CallFailure {
                        label: self.label.clone(),
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }

    /// Run a generation request, treating blank output as a retryable failure
    pub async fn generate(
        &self,
        generator: &dyn Generator,
        request: &GenerationRequest,
    ) -> Result<GenerationOutput, CallFailure> {
        self.call(|_| async move {
            let output = generator.generate(request).await?;
            if output.content.trim().is_empty() {
                return Err(CallError::EmptyResponse(generator.name().to_string()));
            }
            Ok(output)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy {
            initial_delay_ms: 5000,
            max_delay_ms: 12000,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(10000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(12000)); // Capped
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy {
            initial_delay_ms: 1000,
            backoff: Backoff::Exponential,
            backoff_multiplier: 2.0,
            max_delay_ms: 10000,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(10000));
    }

    #[test]
    fn test_should_retry_by_class() {
        let policy = RetryPolicy::default();

        assert!(policy.should_retry(2, ErrorClass::Transient));
        assert!(!policy.should_retry(3, ErrorClass::Transient));
        assert!(policy.should_retry(1, ErrorClass::Malformed));
        assert!(!policy.should_retry(2, ErrorClass::Malformed));
        assert!(!policy.should_retry(1, ErrorClass::Fatal));
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(CallError::from_status(429, "").class(), ErrorClass::Transient);
        assert_eq!(CallError::from_status(503, "").class(), ErrorClass::Transient);
        assert_eq!(CallError::from_status(400, "bad").class(), ErrorClass::Malformed);
        assert_eq!(CallError::from_status(401, "").class(), ErrorClass::Fatal);
    }

    #[tokio::test]
    async fn test_call_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let caller = RetryableCaller::new("test", RetryPolicy::immediate(3));

        let result = caller
            .call(|attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(CallError::Network("reset".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_is_not_retried() {
        let calls = AtomicU32::new(0);
        let caller = RetryableCaller::new("test", RetryPolicy::immediate(5));

        let result: Result<(), _> = caller
            .call(|_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CallError::Fatal("missing api key".to_string())) }
            })
            .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
