//! Provisio deployment transactions
//!
//! Multi-step provisioning workflows create remote resources one after
//! another. This crate tracks what each step created and, when a later step
//! fails, removes it again in reverse creation order.
//!
//! # Features
//!
//! - **Append-only tracking**: resources are registered in creation order
//! - **Reverse-order rollback**: newest resource is removed first
//! - **Best-effort cleanup**: one stuck resource never blocks the others
//! - **Resilient cleanup calls**: each cleanup runs behind the shared breaker
//!   registry with its own retry policy
//! - **Structured reports**: every rollback names what was removed and what
//!   needs manual intervention
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use provisio_core::breaker::CircuitBreakerRegistry;
//! use provisio_core::types::RollbackConfig;
//! use provisio_core::OperationExecutor;
//! use provisio_deploy::DeploymentTransaction;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let executor = OperationExecutor::new(Arc::new(CircuitBreakerRegistry::default()));
//!     let mut tx = DeploymentTransaction::begin(executor, &RollbackConfig::default())?;
//!
//!     tx.register("workspace", "ws-1", "Sales", || async { Ok(()) })?;
//!
//!     let report = tx.rollback().await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod report;
pub mod resource;
pub mod scope;
pub mod transaction;

// Re-export commonly used types
pub use error::{DeployError, Result};
pub use report::{FailedCleanup, RollbackReport};
pub use resource::{CleanupFn, ResourceRef, TrackedResource};
pub use scope::run_in_transaction;
pub use transaction::{DeploymentTransaction, TransactionStatus};
