//! Common test utilities for provisio-deploy
//!
//! - `CleanupLog`: records the order in which cleanups ran
//! - Cleanup builders that succeed, fail, or fail a few times first
//! - Executor and rollback config with fast, deterministic timings

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use provisio_core::breaker::CircuitBreakerRegistry;
use provisio_core::types::{RetryPolicy, RetryStrategy, RollbackConfig};
use provisio_core::OperationExecutor;
use provisio_deploy::DeploymentTransaction;

/// Shared, ordered record of cleanup invocations
#[derive(Clone, Default)]
pub struct CleanupLog(Arc<Mutex<Vec<String>>>);

impl CleanupLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: &str) {
        self.0.lock().unwrap().push(id.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Distinct ids in first-seen order
    pub fn distinct(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for id in self.entries() {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }

    pub fn count(&self, id: &str) -> usize {
        self.entries().iter().filter(|entry| *entry == id).count()
    }

    /// Cleanup that records `id` and succeeds
    pub fn ok(&self, id: &str) -> impl Fn() -> CleanupFuture + Send + Sync + 'static {
        let log = self.clone();
        let id = id.to_string();
        move || -> CleanupFuture {
            log.record(&id);
            Box::pin(async { Ok(()) })
        }
    }

    /// Cleanup that records `id` and always fails
    pub fn failing(&self, id: &str) -> impl Fn() -> CleanupFuture + Send + Sync + 'static {
        let log = self.clone();
        let id = id.to_string();
        move || -> CleanupFuture {
            log.record(&id);
            let id = id.clone();
            Box::pin(async move { Err(anyhow::anyhow!("HTTP 503: cannot delete {}", id)) })
        }
    }

    /// Cleanup that fails `failures` times, then succeeds
    pub fn flaky(
        &self,
        id: &str,
        failures: u32,
    ) -> impl Fn() -> CleanupFuture + Send + Sync + 'static {
        let log = self.clone();
        let id = id.to_string();
        let calls = Arc::new(AtomicU32::new(0));
        move || -> CleanupFuture {
            log.record(&id);
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if call <= failures {
                    Err(anyhow::anyhow!("HTTP 429: rate limited"))
                } else {
                    Ok(())
                }
            })
        }
    }
}

pub type CleanupFuture = std::pin::Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub fn fast_rollback(max_attempts: u32) -> RollbackConfig {
    RollbackConfig {
        breaker: "cleanup".to_string(),
        retry: RetryPolicy {
            max_attempts,
            strategy: RetryStrategy::ExponentialBackoff,
            backoff_multiplier: 2.0,
            initial_delay_ms: 10,
            max_delay_ms: 1000,
            jitter: false,
        },
    }
}

pub fn executor() -> OperationExecutor {
    OperationExecutor::new(Arc::new(CircuitBreakerRegistry::default()))
}

pub fn transaction(max_attempts: u32) -> DeploymentTransaction {
    DeploymentTransaction::begin(executor(), &fast_rollback(max_attempts))
        .expect("test rollback config is valid")
}
