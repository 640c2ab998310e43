//! Common test utilities for provisio-core
//!
//! - `RemoteError`: an HTTP-status-classified error like a REST client returns
//! - `MockDependency`: a scripted remote endpoint that records invocations
//! - Policy and breaker builders with short, deterministic timings

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use provisio_core::retry::HttpStatusError;
use provisio_core::types::{CircuitBreakerConfig, RetryPolicy, RetryStrategy};

/// Error returned by the mock remote API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn status(status: u16, message: &str) -> Self {
        Self {
            status: Some(status),
            message: message.to_string(),
        }
    }

    pub fn unavailable() -> Self {
        Self::status(503, "service unavailable")
    }

    pub fn bad_request() -> Self {
        Self::status(400, "invalid workspace name")
    }

    pub fn connection_reset() -> Self {
        Self {
            status: None,
            message: "connection reset".to_string(),
        }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl HttpStatusError for RemoteError {
    fn status_code(&self) -> Option<u16> {
        self.status
    }
}

/// Scripted remote endpoint
///
/// Responses are consumed in order; once the script runs out every call
/// returns the fallback.
#[derive(Clone)]
pub struct MockDependency {
    script: Arc<Mutex<VecDeque<Result<String, RemoteError>>>>,
    fallback: Result<String, RemoteError>,
    calls: Arc<AtomicU32>,
}

impl MockDependency {
    /// Endpoint that always succeeds with `value`
    pub fn healthy(value: &str) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Ok(value.to_string()),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Endpoint that always fails with `error`
    pub fn failing(error: RemoteError) -> Self {
        Self {
            fallback: Err(error),
            ..Self::healthy("")
        }
    }

    /// Endpoint that fails `times` times with `error`, then returns `value`
    pub fn flaky(times: usize, error: RemoteError, value: &str) -> Self {
        let dependency = Self::healthy(value);
        {
            let mut script = dependency.script.lock().unwrap();
            for _ in 0..times {
                script.push_back(Err(error.clone()));
            }
        }
        dependency
    }

    pub async fn call(&self) -> Result<String, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Deterministic exponential policy
pub fn fast_policy(max_attempts: u32, initial_ms: u64) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        strategy: RetryStrategy::ExponentialBackoff,
        backoff_multiplier: 2.0,
        initial_delay_ms: initial_ms,
        max_delay_ms: initial_ms * 100,
        jitter: false,
    }
}

pub fn breaker_config(failures: u32, successes: u32, reset_ms: u64) -> CircuitBreakerConfig {
    CircuitBreakerConfig::new(failures, successes, Duration::from_millis(reset_ms))
        .expect("test breaker config is valid")
}
