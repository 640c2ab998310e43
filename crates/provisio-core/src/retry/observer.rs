//! Retry loop events and the observers that consume them

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::error::CancelReason;

/// Something that happened inside one retry loop
#[derive(Clone, Copy)]
pub enum RetryEvent<'a> {
    /// Attempt `attempt` of `max_attempts` is about to call the operation
    AttemptStarted { attempt: u32, max_attempts: u32 },
    /// The attempt failed and the loop will wait `delay` before the next one
    AttemptFailed {
        attempt: u32,
        error: &'a dyn fmt::Display,
        delay: Duration,
    },
    Succeeded { attempts: u32, elapsed: Duration },
    /// The last permitted attempt failed
    Exhausted {
        attempts: u32,
        error: &'a dyn fmt::Display,
    },
    /// The predicate refused to retry this error
    NonRetryable {
        attempt: u32,
        error: &'a dyn fmt::Display,
    },
    /// The caller's token or deadline stopped the loop
    Cancelled { attempts: u32, reason: CancelReason },
}

impl fmt::Debug for RetryEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => write!(f, "AttemptStarted({}/{})", attempt, max_attempts),
            RetryEvent::AttemptFailed {
                attempt,
                error,
                delay,
            } => write!(f, "AttemptFailed({}, {}, {:?})", attempt, error, delay),
            RetryEvent::Succeeded { attempts, .. } => write!(f, "Succeeded({})", attempts),
            RetryEvent::Exhausted { attempts, error } => {
                write!(f, "Exhausted({}, {})", attempts, error)
            }
            RetryEvent::NonRetryable { attempt, error } => {
                write!(f, "NonRetryable({}, {})", attempt, error)
            }
            RetryEvent::Cancelled { attempts, reason } => {
                write!(f, "Cancelled({}, {})", attempts, reason)
            }
        }
    }
}

/// Receives the events of every retry loop it is attached to
///
/// # Example
///
/// ```rust
/// use provisio_core::retry::{RetryEvent, RetryObserver};
///
/// struct CountFailures(std::sync::atomic::AtomicU32);
///
/// impl RetryObserver for CountFailures {
///     fn observe(&self, event: &RetryEvent<'_>) {
///         if let RetryEvent::AttemptFailed { .. } = event {
///             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait RetryObserver: Send + Sync {
    fn observe(&self, event: &RetryEvent<'_>);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpObserver;

impl RetryObserver for NoOpObserver {
    fn observe(&self, _event: &RetryEvent<'_>) {}
}

impl<T: RetryObserver + ?Sized> RetryObserver for Arc<T> {
    fn observe(&self, event: &RetryEvent<'_>) {
        (**self).observe(event)
    }
}

/// Logs retry events with `tracing`, tagged with the operation name
///
/// Starts and first-attempt successes are DEBUG, failed attempts,
/// non-retryable errors and cancellations are WARN, a success after retries
/// is INFO and exhaustion is ERROR.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    operation: String,
}

impl TracingObserver {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }
}

impl Default for TracingObserver {
    fn default() -> Self {
        Self::new("retry")
    }
}

impl RetryObserver for TracingObserver {
    fn observe(&self, event: &RetryEvent<'_>) {
        let operation = self.operation.as_str();
        match *event {
            RetryEvent::AttemptStarted {
                attempt,
                max_attempts,
            } => {
                tracing::debug!(operation, attempt, max_attempts, "calling remote operation");
            }
            RetryEvent::AttemptFailed {
                attempt,
                error,
                delay,
            } => {
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "remote call failed, backing off"
                );
            }
            RetryEvent::Succeeded { attempts, elapsed } if attempts > 1 => {
                tracing::info!(
                    operation,
                    attempts,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "remote call recovered after retries"
                );
            }
            RetryEvent::Succeeded { elapsed, .. } => {
                tracing::debug!(
                    operation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "remote call succeeded"
                );
            }
            RetryEvent::Exhausted { attempts, error } => {
                tracing::error!(operation, attempts, error = %error, "retry budget exhausted");
            }
            RetryEvent::NonRetryable { attempt, error } => {
                tracing::warn!(operation, attempt, error = %error, "error is not retryable");
            }
            RetryEvent::Cancelled { attempts, reason } => {
                tracing::warn!(operation, attempts, reason = %reason, "retry loop stopped early");
            }
        }
    }
}

/// Counts events by kind; handy in tests and for ad-hoc metrics
#[derive(Debug, Default)]
pub struct StatsObserver {
    attempt_starts: AtomicU32,
    failures: AtomicU32,
    successes: AtomicU32,
    exhaustions: AtomicU32,
    non_retryable: AtomicU32,
    cancellations: AtomicU32,
}

impl StatsObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt_starts(&self) -> u32 {
        self.attempt_starts.load(Ordering::SeqCst)
    }

    /// Failures that were followed by a retry
    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    pub fn successes(&self) -> u32 {
        self.successes.load(Ordering::SeqCst)
    }

    pub fn exhaustions(&self) -> u32 {
        self.exhaustions.load(Ordering::SeqCst)
    }

    pub fn non_retryable(&self) -> u32 {
        self.non_retryable.load(Ordering::SeqCst)
    }

    pub fn cancellations(&self) -> u32 {
        self.cancellations.load(Ordering::SeqCst)
    }
}

impl RetryObserver for StatsObserver {
    fn observe(&self, event: &RetryEvent<'_>) {
        let counter = match event {
            RetryEvent::AttemptStarted { .. } => &self.attempt_starts,
            RetryEvent::AttemptFailed { .. } => &self.failures,
            RetryEvent::Succeeded { .. } => &self.successes,
            RetryEvent::Exhausted { .. } => &self.exhaustions,
            RetryEvent::NonRetryable { .. } => &self.non_retryable,
            RetryEvent::Cancelled { .. } => &self.cancellations,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}
