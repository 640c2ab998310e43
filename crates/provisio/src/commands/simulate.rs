//! Simulate command
//!
//! Provisions a workspace, a dataset and a series of role bindings against
//! the in-memory platform. Every create call goes through the shared
//! `provisioning-api` breaker with the per-operation retry policy, inside a
//! deployment transaction that rolls back whatever was created if a step
//! fails.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use provisio_core::breaker::{BreakerSnapshot, CircuitBreakerRegistry};
use provisio_core::retry::{
    HttpStatusPredicate, RetryExecutor, RetryExecutorBuilder, TracingObserver,
};
use provisio_core::types::ResilienceConfig;
use provisio_core::OperationExecutor;
use provisio_deploy::{run_in_transaction, DeployError, DeploymentTransaction, RollbackReport};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::cli::SimulateArgs;
use crate::commands::load_config;
use crate::output;
use crate::platform::{Faults, RemoteResource, SimulatedPlatform};

/// Breaker guarding every call to the provisioning API
const PROVISIONING_API: &str = "provisioning-api";

type StepRetry = RetryExecutor<HttpStatusPredicate, TracingObserver>;

struct Step {
    number: u32,
    operation: &'static str,
    kind: &'static str,
    name: String,
    retry: StepRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum Outcome {
    Committed,
    RolledBack,
    RollbackFailed,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct SimulationSummary {
    transaction_id: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created: Vec<RemoteResource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rollback: Option<RollbackReport>,
    /// Resources still present on the platform afterwards
    remaining: Vec<RemoteResource>,
    api_calls: u64,
    breakers: Vec<BreakerSnapshot>,
}

pub async fn run(args: SimulateArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    check_step("--fail-at", args.fail_at, args.steps)?;
    check_step("--stuck-cleanup", args.stuck_cleanup, args.steps)?;

    let config = load_config(config_path)?;
    let registry = Arc::new(CircuitBreakerRegistry::from_config(&config.circuit_breakers)?);
    let executor = OperationExecutor::new(Arc::clone(&registry));

    let cancel = CancellationToken::new();
    let interrupt = tokio::spawn(watch_interrupt(cancel.clone()));

    let platform = Arc::new(SimulatedPlatform::new(Faults {
        transient_failures: args.flaky,
        fail_at: args.fail_at,
        stuck_cleanup: args.stuck_cleanup,
    }));
    let steps = plan(&args, &config, &cancel)?;

    let tx = DeploymentTransaction::begin(executor.clone(), &config.rollback)?;
    let transaction_id = tx.id().to_string();

    if !args.json {
        output::header(&format!("Provisioning '{}'", args.name));
        output::kv("Transaction", &transaction_id);
        output::kv("Steps", &args.steps.to_string());
    }

    let workflow_platform = Arc::clone(&platform);
    let result = run_in_transaction(tx, move |tx| {
        Box::pin(provision(tx, executor, workflow_platform, steps))
    })
    .await;
    interrupt.abort();

    let summary = match result {
        Ok(created) => SimulationSummary {
            transaction_id,
            outcome: Outcome::Committed,
            error: None,
            created,
            rollback: None,
            remaining: platform.live_resources(),
            api_calls: platform.total_calls(),
            breakers: registry.snapshots(),
        },
        Err(err) => {
            let Some(report) = err.rollback_report().cloned() else {
                return Err(err.into());
            };
            SimulationSummary {
                transaction_id,
                outcome: if report.requires_manual_intervention() {
                    Outcome::RollbackFailed
                } else {
                    Outcome::RolledBack
                },
                error: Some(failure_cause(&err)),
                created: Vec::new(),
                rollback: Some(report),
                remaining: platform.live_resources(),
                api_calls: platform.total_calls(),
                breakers: registry.snapshots(),
            }
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    match summary.outcome {
        Outcome::Committed => Ok(()),
        Outcome::RolledBack => bail!("deployment {} was rolled back", summary.transaction_id),
        Outcome::RollbackFailed => bail!(
            "deployment {} was rolled back incompletely; {} resource(s) need manual cleanup",
            summary.transaction_id,
            summary.rollback.as_ref().map_or(0, |r| r.failed.len())
        ),
    }
}

async fn provision(
    tx: &mut DeploymentTransaction,
    executor: OperationExecutor,
    platform: Arc<SimulatedPlatform>,
    steps: Vec<Step>,
) -> Result<Vec<RemoteResource>> {
    let mut created = Vec::with_capacity(steps.len());

    for step in &steps {
        let resource = executor
            .run(PROVISIONING_API, &step.retry, || {
                platform.create(step.number, step.kind, &step.name)
            })
            .await
            .with_context(|| {
                format!(
                    "step {} ({} '{}') failed",
                    step.number, step.operation, step.name
                )
            })?;

        tx.register(
            resource.kind.clone(),
            resource.id.clone(),
            resource.name.clone(),
            SimulatedPlatform::cleanup_for(&platform, &resource.id),
        )?;
        created.push(resource);
    }

    tx.commit()?;
    Ok(created)
}

/// Build the step list: workspace, dataset, then role bindings
fn plan(
    args: &SimulateArgs,
    config: &ResilienceConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Step>> {
    (1..=args.steps)
        .map(|number| {
            let (operation, kind, name) = match number {
                1 => ("create-workspace", "workspace", args.name.clone()),
                2 => ("create-dataset", "dataset", format!("{}-events", args.name)),
                n => (
                    "assign-role",
                    "role-binding",
                    format!("{}/member-{}", args.name, n - 2),
                ),
            };

            let retry = RetryExecutorBuilder::new()
                .with_policy(config.policy_for(operation).clone())
                .with_predicate(HttpStatusPredicate::default_http())
                .with_observer(TracingObserver::new(operation))
                .with_cancellation(cancel.clone())
                .build()
                .with_context(|| format!("invalid retry policy for {}", operation))?;

            Ok(Step {
                number,
                operation,
                kind,
                name,
                retry,
            })
        })
        .collect()
}

fn check_step(flag: &str, step: Option<u32>, steps: u32) -> Result<()> {
    match step {
        Some(step) if step == 0 || step > steps => {
            bail!("{} must name a step between 1 and {}, got {}", flag, steps, step)
        }
        _ => Ok(()),
    }
}

/// Cancel pending retries on Ctrl-C; rollback cleanup is not affected
async fn watch_interrupt(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupt received, cancelling pending retries");
        cancel.cancel();
    }
}

fn failure_cause(err: &DeployError) -> String {
    match err {
        DeployError::WorkflowFailed { cause, .. } => format!("{:#}", cause),
        other => other.to_string(),
    }
}

fn print_summary(summary: &SimulationSummary) {
    for resource in &summary.created {
        output::success(&format!(
            "{} '{}' created ({})",
            resource.kind, resource.name, resource.id
        ));
    }

    match summary.outcome {
        Outcome::Committed => output::success("Deployment committed"),
        Outcome::RolledBack | Outcome::RollbackFailed => {
            if let Some(error) = &summary.error {
                output::error(&format!("Deployment failed: {}", error));
            }
        }
    }

    if let Some(report) = &summary.rollback {
        output::header("Rollback");
        for resource in &report.cleaned {
            output::info(&format!("Removed {}", resource));
        }
        for failed in &report.failed {
            output::warning(&format!(
                "Could not remove {} after {} attempt(s): {}",
                failed.resource, failed.attempts, failed.error
            ));
        }
        output::kv("Duration", &format!("{}ms", report.duration.as_millis()));
    }

    output::header("Circuit breakers");
    summary.breakers.iter().for_each(output::breaker);
    output::kv("API calls", &summary.api_calls.to_string());

    if summary.outcome == Outcome::RollbackFailed {
        output::warning(&format!(
            "{} resource(s) remain on the platform and need manual cleanup",
            summary.remaining.len()
        ));
        for resource in &summary.remaining {
            output::kv(&resource.kind, &format!("{} ({})", resource.name, resource.id));
        }
    }
}
