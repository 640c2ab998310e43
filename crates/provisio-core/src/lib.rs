//! # provisio-core
//!
//! Resilience substrate for the Provisio provisioning tool:
//! - Retry execution engine with policy-based configuration
//! - Per-dependency circuit breakers and a shared breaker registry
//! - `OperationExecutor`, which gates a retried call behind its breaker
//! - Resilience configuration types and the hierarchical config loader

pub mod breaker;
pub mod config;
pub mod error;
pub mod executor;
pub mod retry;
pub mod types;

pub use breaker::{CircuitBreaker, CircuitBreakerRegistry, CircuitOpenError};
pub use config::HierarchicalConfigLoader;
pub use error::{Error, Result};
pub use executor::{OperationError, OperationExecutor};
pub use types::ResilienceConfig;
