//! Breaker-gated retry execution for one logical remote call
//!
//! The circuit breaker wraps the whole retry sequence. An open circuit
//! rejects the call before any attempt is made; otherwise the retry loop
//! runs to completion and the breaker records only its final outcome, so a
//! call that needed three attempts counts as one success or one failure.

use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::breaker::{CircuitBreakerRegistry, CircuitOpenError};
use crate::retry::{RetryError, RetryExecutor, RetryObserver, RetryPredicate};

/// Failure of an [`OperationExecutor::run`] call
#[derive(Debug)]
pub enum OperationError<E> {
    /// The breaker rejected the call; the operation was never invoked
    CircuitOpen(CircuitOpenError),
    /// The retry loop gave up, was stopped by the predicate, or was cancelled
    Retry(RetryError<E>),
}

impl<E: fmt::Display> fmt::Display for OperationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationError::CircuitOpen(err) => write!(f, "{}", err),
            OperationError::Retry(err) => write!(f, "{}", err),
        }
    }
}

impl<E: Error + 'static> Error for OperationError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OperationError::CircuitOpen(err) => Some(err),
            OperationError::Retry(err) => Some(err),
        }
    }
}

impl<E> From<CircuitOpenError> for OperationError<E> {
    fn from(err: CircuitOpenError) -> Self {
        OperationError::CircuitOpen(err)
    }
}

impl<E> From<RetryError<E>> for OperationError<E> {
    fn from(err: RetryError<E>) -> Self {
        OperationError::Retry(err)
    }
}

impl<E> OperationError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, OperationError::CircuitOpen(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OperationError::Retry(err) if err.is_cancelled())
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, OperationError::Retry(err) if err.is_exhausted())
    }

    /// Attempts made; zero when the circuit rejected the call
    pub fn attempts(&self) -> u32 {
        match self {
            OperationError::CircuitOpen(_) => 0,
            OperationError::Retry(err) => err.attempts(),
        }
    }

    pub fn retry_error(&self) -> Option<&RetryError<E>> {
        match self {
            OperationError::CircuitOpen(_) => None,
            OperationError::Retry(err) => Some(err),
        }
    }

    /// The operation's own error, if one was produced
    pub fn into_source(self) -> Option<E> {
        match self {
            OperationError::CircuitOpen(_) => None,
            OperationError::Retry(err) => err.into_source(),
        }
    }

    pub fn map_err<F, E2>(self, f: F) -> OperationError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            OperationError::CircuitOpen(err) => OperationError::CircuitOpen(err),
            OperationError::Retry(err) => OperationError::Retry(err.map_err(f)),
        }
    }
}

/// Runs remote calls behind the shared breaker registry
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use provisio_core::breaker::CircuitBreakerRegistry;
/// use provisio_core::retry::RetryExecutor;
/// use provisio_core::types::RetryPolicy;
/// use provisio_core::{OperationError, OperationExecutor};
///
/// async fn create_workspace() -> Result<String, OperationError<std::io::Error>> {
///     let registry = Arc::new(CircuitBreakerRegistry::default());
///     let executor = OperationExecutor::new(registry);
///     let retry = RetryExecutor::from_policy(RetryPolicy::default()).expect("valid policy");
///
///     executor
///         .run("provisioning-api", &retry, || async { Ok("ws-123".to_string()) })
///         .await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct OperationExecutor {
    registry: Arc<CircuitBreakerRegistry>,
}

impl OperationExecutor {
    pub fn new(registry: Arc<CircuitBreakerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.registry
    }

    /// Run `op` with retries, gated by the breaker named `breaker`
    ///
    /// A cancelled retry loop is not recorded against the breaker; the
    /// admission is released unchanged.
    pub async fn run<P, O, F, Fut, T, E>(
        &self,
        breaker: &str,
        retry: &RetryExecutor<P, O>,
        op: F,
    ) -> Result<T, OperationError<E>>
    where
        P: RetryPredicate<E>,
        O: RetryObserver,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let breaker = self.registry.get(breaker);
        let permit = breaker.try_acquire()?;

        match retry.execute(op).await {
            Ok(value) => {
                permit.record_success();
                Ok(value)
            }
            Err(err) if err.is_cancelled() => {
                tracing::debug!(breaker = %breaker.name(), "call cancelled, breaker unchanged");
                drop(permit);
                Err(OperationError::Retry(err))
            }
            Err(err) => {
                permit.record_failure();
                Err(OperationError::Retry(err))
            }
        }
    }
}
