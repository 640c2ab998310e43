//! Scoped transaction usage
//!
//! [`run_in_transaction`] drives a workflow against an open transaction and
//! guarantees a rollback on every exit path that did not commit.

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::warn;

use crate::error::{DeployError, Result};
use crate::report::RollbackReport;
use crate::transaction::{DeploymentTransaction, TransactionStatus};

/// Run `workflow` inside `tx`
///
/// The workflow must call [`DeploymentTransaction::commit`] before it
/// returns `Ok`; commit is never implied. Otherwise the transaction is
/// rolled back before control returns:
///
/// - `Err(cause)` becomes [`DeployError::WorkflowFailed`]
/// - `Ok` without a commit becomes [`DeployError::NotCommitted`]
/// - a panic is re-raised after the rollback has finished
///
/// Dropping the returned future mid-workflow cannot roll back; the
/// transaction logs its orphaned resources instead.
///
/// # Example
///
/// ```rust,no_run
/// use provisio_deploy::{run_in_transaction, DeploymentTransaction};
///
/// async fn provision(tx: DeploymentTransaction) -> provisio_deploy::Result<String> {
///     run_in_transaction(tx, |tx| {
///         Box::pin(async move {
///             tx.register("workspace", "ws-1", "Sales", || async { Ok(()) })?;
///             tx.commit()?;
///             Ok("ws-1".to_string())
///         })
///     })
///     .await
/// }
/// ```
pub async fn run_in_transaction<T, F>(mut tx: DeploymentTransaction, workflow: F) -> Result<T>
where
    F: for<'a> FnOnce(&'a mut DeploymentTransaction) -> BoxFuture<'a, anyhow::Result<T>>,
{
    let outcome = AssertUnwindSafe(workflow(&mut tx)).catch_unwind().await;

    match outcome {
        Ok(Ok(value)) if tx.status() == TransactionStatus::Committed => Ok(value),
        Ok(Ok(_)) => {
            let report = finish(&mut tx).await;
            Err(DeployError::NotCommitted {
                transaction_id: tx.id().to_string(),
                report: report.unwrap_or_else(|| empty_report(&tx)),
            })
        }
        Ok(Err(cause)) => {
            if tx.status() == TransactionStatus::Committed {
                warn!(
                    transaction_id = %tx.id(),
                    "workflow failed after commit, nothing to roll back"
                );
            }
            let report = finish(&mut tx).await;
            Err(DeployError::WorkflowFailed { cause, report })
        }
        Err(panic) => {
            warn!(transaction_id = %tx.id(), "workflow panicked, rolling back");
            finish(&mut tx).await;
            std::panic::resume_unwind(panic)
        }
    }
}

/// Roll back if still open; otherwise hand back the earlier report
async fn finish(tx: &mut DeploymentTransaction) -> Option<RollbackReport> {
    match tx.status() {
        TransactionStatus::Open => tx.rollback().await.ok(),
        _ => tx.report().cloned(),
    }
}

fn empty_report(tx: &DeploymentTransaction) -> RollbackReport {
    RollbackReport {
        transaction_id: tx.id().to_string(),
        status: tx.status(),
        cleaned: Vec::new(),
        failed: Vec::new(),
        duration: std::time::Duration::ZERO,
    }
}
