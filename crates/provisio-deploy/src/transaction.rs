//! Deployment transaction with reverse-order rollback

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use provisio_core::retry::{AlwaysRetry, RetryExecutor, RetryExecutorBuilder, TracingObserver};
use provisio_core::types::RollbackConfig;
use provisio_core::{OperationError, OperationExecutor};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{DeployError, Result};
use crate::report::{FailedCleanup, RollbackReport};
use crate::resource::TrackedResource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionStatus {
    Open,
    Committed,
    RolledBack,
    RollbackFailed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Open)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Open => write!(f, "open"),
            TransactionStatus::Committed => write!(f, "committed"),
            TransactionStatus::RolledBack => write!(f, "rolled back"),
            TransactionStatus::RollbackFailed => write!(f, "rollback failed"),
        }
    }
}

/// Tracks remote resources created by one provisioning workflow
///
/// Register each resource right after it is created. Finish with
/// [`commit`](Self::commit) to keep everything, or
/// [`rollback`](Self::rollback) to remove it newest-first. Either call is
/// final. Cleanup calls go through the shared [`OperationExecutor`] under the
/// rollback retry policy. They are accounted under the rollback breaker,
/// which every transaction on the same registry shares, unless the resource
/// was registered with its own breaker.
pub struct DeploymentTransaction {
    id: String,
    resources: Vec<TrackedResource>,
    status: TransactionStatus,
    started_at: DateTime<Utc>,
    executor: OperationExecutor,
    cleanup_breaker: String,
    cleanup_retry: RetryExecutor<AlwaysRetry, TracingObserver>,
    report: Option<RollbackReport>,
}

impl DeploymentTransaction {
    /// Open a new transaction
    pub fn begin(executor: OperationExecutor, rollback: &RollbackConfig) -> Result<Self> {
        let cleanup_retry = RetryExecutorBuilder::new()
            .with_policy(rollback.retry.clone())
            .with_observer(TracingObserver::new("rollback-cleanup"))
            .build()?;

        let id = Uuid::new_v4().to_string();
        info!(transaction_id = %id, "deployment transaction started");

        Ok(Self {
            id,
            resources: Vec::new(),
            status: TransactionStatus::Open,
            started_at: Utc::now(),
            executor,
            cleanup_breaker: rollback.breaker.clone(),
            cleanup_retry,
            report: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Tracked resources in creation order
    pub fn resources(&self) -> &[TrackedResource] {
        &self.resources
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Report of the rollback, once one has run
    pub fn report(&self) -> Option<&RollbackReport> {
        self.report.as_ref()
    }

    fn ensure_open(&self, action: &'static str) -> Result<()> {
        if self.status == TransactionStatus::Open {
            return Ok(());
        }
        Err(DeployError::InvalidState {
            transaction_id: self.id.clone(),
            status: self.status,
            action,
        })
    }

    /// Track a freshly created resource
    ///
    /// `cleanup` must be idempotent: it may run several times and against a
    /// resource that is already partially gone.
    pub fn register<F, Fut>(
        &mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        display_name: impl Into<String>,
        cleanup: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let resource = TrackedResource::new(resource_type, resource_id, display_name, cleanup);
        self.track(resource)
    }

    /// Like [`register`](Self::register), with the cleanup accounted under
    /// `breaker` instead of the shared rollback breaker
    ///
    /// Use one breaker per dependency so a stuck dependency does not make
    /// rollbacks of unrelated resources fail fast.
    pub fn register_with_breaker<F, Fut>(
        &mut self,
        breaker: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        display_name: impl Into<String>,
        cleanup: F,
    ) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let resource = TrackedResource::new(resource_type, resource_id, display_name, cleanup)
            .with_cleanup_breaker(breaker);
        self.track(resource)
    }

    fn track(&mut self, resource: TrackedResource) -> Result<()> {
        self.ensure_open("register a resource")?;
        info!(
            transaction_id = %self.id,
            resource_type = resource.resource_type(),
            resource_id = resource.resource_id(),
            cleanup_breaker = resource.cleanup_breaker().unwrap_or(&self.cleanup_breaker),
            "resource registered"
        );
        self.resources.push(resource);
        Ok(())
    }

    /// Keep every tracked resource and close the transaction
    pub fn commit(&mut self) -> Result<()> {
        self.ensure_open("commit")?;
        self.status = TransactionStatus::Committed;
        info!(
            transaction_id = %self.id,
            resources = self.resources.len(),
            "deployment transaction committed"
        );
        Ok(())
    }

    /// Undo every tracked resource, newest first
    ///
    /// A failed cleanup is recorded and the rollback moves on to the next
    /// resource. The returned report lists what was removed and what was
    /// left behind; `RollbackFailed` is a status, not an error.
    pub async fn rollback(&mut self) -> Result<RollbackReport> {
        self.ensure_open("roll back")?;

        info!(
            transaction_id = %self.id,
            resources = self.resources.len(),
            "rolling back deployment transaction"
        );

        let start = Instant::now();
        let mut cleaned = Vec::new();
        let mut failed = Vec::new();

        for resource in self.resources.iter().rev() {
            let breaker = resource.cleanup_breaker().unwrap_or(&self.cleanup_breaker);
            let outcome = self
                .executor
                .run(breaker, &self.cleanup_retry, || {
                    AssertUnwindSafe(resource.cleanup())
                        .catch_unwind()
                        .map(|result| {
                            result.unwrap_or_else(|_| Err(anyhow::anyhow!("cleanup panicked")))
                        })
                })
                .await;

            match outcome {
                Ok(()) => {
                    info!(
                        transaction_id = %self.id,
                        resource_type = resource.resource_type(),
                        resource_id = resource.resource_id(),
                        "resource cleaned up"
                    );
                    cleaned.push(resource.info().clone());
                }
                Err(err) => {
                    warn!(
                        transaction_id = %self.id,
                        resource_type = resource.resource_type(),
                        resource_id = resource.resource_id(),
                        error = %err,
                        "cleanup failed, continuing rollback"
                    );
                    failed.push(FailedCleanup {
                        resource: resource.info().clone(),
                        error: describe(&err),
                        attempts: err.attempts(),
                    });
                }
            }
        }

        self.status = if failed.is_empty() {
            TransactionStatus::RolledBack
        } else {
            error!(
                transaction_id = %self.id,
                failed = failed.len(),
                "rollback incomplete, manual cleanup required"
            );
            TransactionStatus::RollbackFailed
        };

        let report = RollbackReport {
            transaction_id: self.id.clone(),
            status: self.status,
            cleaned,
            failed,
            duration: start.elapsed(),
        };
        self.report = Some(report.clone());
        Ok(report)
    }
}

fn describe(err: &OperationError<anyhow::Error>) -> String {
    match err.retry_error().and_then(|e| e.source_ref()) {
        Some(source) => format!("{:#}", source),
        None => err.to_string(),
    }
}

impl fmt::Debug for DeploymentTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentTransaction")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("resources", &self.resources)
            .field("cleanup_breaker", &self.cleanup_breaker)
            .finish_non_exhaustive()
    }
}

impl Drop for DeploymentTransaction {
    fn drop(&mut self) {
        if self.status == TransactionStatus::Open && !self.resources.is_empty() {
            let orphaned: Vec<String> = self
                .resources
                .iter()
                .map(|r| r.info().to_string())
                .collect();
            error!(
                transaction_id = %self.id,
                orphaned = ?orphaned,
                "transaction dropped while open; resources were not committed or rolled back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use provisio_core::breaker::CircuitBreakerRegistry;
    use provisio_core::types::{RetryPolicy, RetryStrategy};
    use std::sync::{Arc, Mutex};

    fn rollback_config(max_attempts: u32) -> RollbackConfig {
        RollbackConfig {
            breaker: "cleanup".to_string(),
            retry: RetryPolicy {
                max_attempts,
                strategy: RetryStrategy::FixedDelay,
                backoff_multiplier: 2.0,
                initial_delay_ms: 10,
                max_delay_ms: 100,
                jitter: false,
            },
        }
    }

    fn open_transaction() -> DeploymentTransaction {
        let executor = OperationExecutor::new(Arc::new(CircuitBreakerRegistry::default()));
        DeploymentTransaction::begin(executor, &rollback_config(2)).unwrap()
    }

    #[test]
    fn test_begin_rejects_invalid_rollback_policy() {
        let executor = OperationExecutor::new(Arc::new(CircuitBreakerRegistry::default()));
        let mut config = rollback_config(2);
        config.retry.max_attempts = 0;

        let err = DeploymentTransaction::begin(executor, &config).unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));
    }

    #[test]
    fn test_new_transaction_is_open_and_empty() {
        let tx = open_transaction();
        assert_eq!(tx.status(), TransactionStatus::Open);
        assert!(tx.is_empty());
        assert!(tx.report().is_none());
        assert!(Uuid::parse_str(tx.id()).is_ok());
    }

    #[test]
    fn test_register_preserves_creation_order() {
        let mut tx = open_transaction();
        for id in ["ws-1", "ds-1", "rb-1"] {
            tx.register("resource", id, id, || async { Ok(()) }).unwrap();
        }

        let ids: Vec<&str> = tx.resources().iter().map(|r| r.resource_id()).collect();
        assert_eq!(ids, vec!["ws-1", "ds-1", "rb-1"]);
    }

    #[test]
    fn test_double_commit_is_invalid_state() {
        let mut tx = open_transaction();
        tx.commit().unwrap();

        let err = tx.commit().unwrap_err();
        assert!(matches!(
            err,
            DeployError::InvalidState {
                status: TransactionStatus::Committed,
                action: "commit",
                ..
            }
        ));
    }

    #[test]
    fn test_register_after_commit_is_invalid_state() {
        let mut tx = open_transaction();
        tx.commit().unwrap();

        let err = tx
            .register("workspace", "ws-1", "Sales", || async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, DeployError::InvalidState { .. }));
        assert!(tx.is_empty());
    }

    #[tokio::test]
    async fn test_rollback_after_commit_is_invalid_state() {
        let cleaned = Arc::new(Mutex::new(0));
        let mut tx = open_transaction();
        let counter = Arc::clone(&cleaned);
        tx.register("workspace", "ws-1", "Sales", move || {
            let counter = Arc::clone(&counter);
            async move {
                *counter.lock().unwrap() += 1;
                Ok(())
            }
        })
        .unwrap();
        tx.commit().unwrap();

        let err = tx.rollback().await.unwrap_err();
        assert!(matches!(err, DeployError::InvalidState { .. }));
        assert_eq!(*cleaned.lock().unwrap(), 0);
        assert_eq!(tx.status(), TransactionStatus::Committed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_cleanup_is_recorded_as_failure() {
        let mut tx = open_transaction();
        tx.register("workspace", "ws-1", "Sales", || async { Ok(()) }).unwrap();
        tx.register("dataset", "ds-1", "Orders", || async {
            if true {
                panic!("cleanup bug");
            }
            Ok(())
        })
        .unwrap();

        let report = tx.rollback().await.unwrap();

        assert_eq!(report.status, TransactionStatus::RollbackFailed);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].resource.resource_id, "ds-1");
        assert!(report.failed[0].error.contains("cleanup panicked"));
        assert_eq!(report.cleaned.len(), 1);
    }

    #[tokio::test]
    async fn test_rollback_of_empty_transaction() {
        let mut tx = open_transaction();
        let report = tx.rollback().await.unwrap();

        assert_eq!(report.status, TransactionStatus::RolledBack);
        assert_eq!(report.total(), 0);
        assert_eq!(tx.report(), Some(&report));
    }
}
