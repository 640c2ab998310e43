//! Retry execution engine with policy-based configuration
//!
//! This module runs a fallible async operation repeatedly under a
//! [`RetryPolicy`](crate::types::RetryPolicy) until it succeeds, the
//! predicate rejects an error, the attempts run out, or the caller cancels.
//!
//! # Features
//!
//! - Multiple retry strategies: None, Fixed, Exponential, Linear backoff
//! - Optional jitter applied after the `max_delay_ms` cap
//! - Observable retry attempts via the `RetryObserver` trait
//! - Cooperative cancellation through a `CancellationToken` or deadline
//!
//! # Example
//!
//! ```rust,no_run
//! use provisio_core::retry::{RetryError, RetryExecutor};
//! use provisio_core::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let executor = RetryExecutor::from_policy(RetryPolicy::default())
//!         .expect("default policy is valid");
//!
//!     executor
//!         .execute(|| async {
//!             // Your fallible operation here
//!             Ok("success".to_string())
//!         })
//!         .await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::{CancelReason, RetryError};
pub use executor::{RetryExecutor, RetryExecutorBuilder};
pub use observer::{NoOpObserver, RetryEvent, RetryObserver, StatsObserver, TracingObserver};
pub use strategies::{
    calculate_delay, AlwaysRetry, HttpStatusError, HttpStatusPredicate, NeverRetry,
    RetryPredicate, JITTER_MAX, JITTER_MIN,
};
