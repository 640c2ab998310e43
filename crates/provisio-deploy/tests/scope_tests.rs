//! Integration tests for `run_in_transaction`

mod common;

use std::io;
use std::panic::AssertUnwindSafe;

use common::{executor, transaction, CleanupLog};
use futures::FutureExt;
use provisio_core::retry::RetryExecutorBuilder;
use provisio_core::types::RetryPolicy;
use provisio_deploy::{run_in_transaction, DeployError, TransactionStatus};
use tokio_util::sync::CancellationToken;

#[tokio::test(start_paused = true)]
async fn test_committed_workflow_keeps_resources() {
    let log = CleanupLog::new();
    let (a, b) = (log.ok("A"), log.ok("B"));

    let value = run_in_transaction(transaction(3), |tx| {
        Box::pin(async move {
            tx.register("workspace", "A", "Sales", a)?;
            tx.register("dataset", "B", "Orders", b)?;
            tx.commit()?;
            Ok(tx.len())
        })
    })
    .await
    .unwrap();

    assert_eq!(value, 2);
    assert!(log.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failing_step_rolls_back_before_returning() {
    let log = CleanupLog::new();
    let (a, b) = (log.ok("A"), log.ok("B"));

    let err = run_in_transaction(transaction(3), |tx| {
        Box::pin(async move {
            tx.register("workspace", "A", "Sales", a)?;
            tx.register("dataset", "B", "Orders", b)?;
            if tx.len() == 2 {
                anyhow::bail!("role assignment rejected: HTTP 400");
            }
            Ok(())
        })
    })
    .await
    .unwrap_err();

    assert_eq!(log.entries(), vec!["B", "A"]);
    match &err {
        DeployError::WorkflowFailed { cause, report } => {
            assert!(cause.to_string().contains("HTTP 400"));
            let report = report.as_ref().expect("rollback report");
            assert_eq!(report.status, TransactionStatus::RolledBack);
            assert_eq!(report.cleaned.len(), 2);
        }
        other => panic!("expected WorkflowFailed, got {:?}", other),
    }
    assert!(!err.requires_manual_intervention());
    assert!(err.to_string().contains("rolled back 2 resource(s)"));
}

#[tokio::test(start_paused = true)]
async fn test_uncommitted_success_is_rolled_back() {
    let log = CleanupLog::new();
    let a = log.ok("A");

    let err = run_in_transaction(transaction(3), |tx| {
        Box::pin(async move {
            tx.register("workspace", "A", "Sales", a)?;
            Ok("forgot to commit")
        })
    })
    .await
    .unwrap_err();

    assert!(matches!(err, DeployError::NotCommitted { .. }));
    assert_eq!(err.rollback_report().map(|r| r.cleaned.len()), Some(1));
    assert_eq!(log.entries(), vec!["A"]);
}

#[tokio::test(start_paused = true)]
async fn test_failure_after_commit_has_nothing_to_roll_back() {
    let log = CleanupLog::new();
    let a = log.ok("A");

    let err = run_in_transaction(transaction(3), |tx| {
        Box::pin(async move {
            tx.register("workspace", "A", "Sales", a)?;
            tx.commit()?;
            tx.commit()?;
            Ok(())
        })
    })
    .await
    .unwrap_err();

    match err {
        DeployError::WorkflowFailed { cause, report } => {
            assert!(report.is_none());
            assert!(cause.to_string().contains("already committed"));
        }
        other => panic!("expected WorkflowFailed, got {:?}", other),
    }
    assert!(log.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_panic_rolls_back_then_propagates() {
    let log = CleanupLog::new();
    let (a, b) = (log.ok("A"), log.ok("B"));

    let outcome = AssertUnwindSafe(run_in_transaction(transaction(3), |tx| {
        Box::pin(async move {
            tx.register("workspace", "A", "Sales", a)?;
            tx.register("dataset", "B", "Orders", b)?;
            if tx.len() == 2 {
                panic!("bug in provisioning step");
            }
            Ok(())
        })
    }))
    .catch_unwind()
    .await;

    let panic = outcome.unwrap_err();
    assert_eq!(
        panic.downcast_ref::<&str>().copied(),
        Some("bug in provisioning step")
    );
    assert_eq!(log.entries(), vec!["B", "A"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_step_still_rolls_back() {
    let log = CleanupLog::new();
    let a = log.ok("A");
    let token = CancellationToken::new();
    token.cancel();

    let executor = executor();
    let retry = RetryExecutorBuilder::new()
        .with_policy(RetryPolicy::default())
        .with_cancellation(token)
        .build()
        .unwrap();

    let err = run_in_transaction(transaction(3), |tx| {
        Box::pin(async move {
            tx.register("workspace", "A", "Sales", a)?;
            executor
                .run("provisioning-api", &retry, || async {
                    Ok::<_, io::Error>("ds-1".to_string())
                })
                .await?;
            tx.commit()?;
            Ok(())
        })
    })
    .await
    .unwrap_err();

    match &err {
        DeployError::WorkflowFailed { cause, report } => {
            assert!(cause.to_string().contains("cancelled"));
            assert_eq!(
                report.as_ref().map(|r| r.status),
                Some(TransactionStatus::RolledBack)
            );
        }
        other => panic!("expected WorkflowFailed, got {:?}", other),
    }
    assert_eq!(log.entries(), vec!["A"]);
}
