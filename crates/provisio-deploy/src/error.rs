//! Error types for provisio-deploy

use thiserror::Error;

use crate::report::RollbackReport;
use crate::transaction::TransactionStatus;

/// Result type alias using provisio-deploy's error type
pub type Result<T> = std::result::Result<T, DeployError>;

/// Deployment transaction error types
#[derive(Error, Debug)]
pub enum DeployError {
    /// The transaction was used after it was committed or rolled back
    #[error("Cannot {action}: transaction {transaction_id} is already {status}")]
    InvalidState {
        transaction_id: String,
        status: TransactionStatus,
        action: &'static str,
    },

    /// The workflow returned an error; its resources were rolled back
    #[error("Deployment workflow failed: {cause:#}{}", report_suffix(.report))]
    WorkflowFailed {
        cause: anyhow::Error,
        /// `None` when the workflow had already committed before failing
        report: Option<RollbackReport>,
    },

    /// The workflow finished without committing; its resources were rolled back
    #[error("Deployment workflow did not commit transaction {transaction_id}; {report}")]
    NotCommitted {
        transaction_id: String,
        report: RollbackReport,
    },

    /// Invalid rollback settings
    #[error(transparent)]
    Config(#[from] provisio_core::Error),
}

impl DeployError {
    /// The rollback report carried by this error, if any
    pub fn rollback_report(&self) -> Option<&RollbackReport> {
        match self {
            DeployError::WorkflowFailed { report, .. } => report.as_ref(),
            DeployError::NotCommitted { report, .. } => Some(report),
            _ => None,
        }
    }

    /// True when resources were left behind and need manual cleanup
    pub fn requires_manual_intervention(&self) -> bool {
        self.rollback_report()
            .is_some_and(|r| r.requires_manual_intervention())
    }
}

fn report_suffix(report: &Option<RollbackReport>) -> String {
    match report {
        Some(report) => format!("; {}", report),
        None => String::new(),
    }
}
