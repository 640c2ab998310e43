//! Why a retry loop gave up

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// What stopped a loop from the caller's side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The cancellation token fired
    Cancelled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CancelReason::Cancelled => "cancelled",
            CancelReason::DeadlineExceeded => "deadline exceeded",
        })
    }
}

/// Terminal failure of [`RetryExecutor::execute`](super::RetryExecutor::execute)
///
/// `E` is the operation's own error type; every variant that saw a failed
/// attempt keeps the most recent one.
#[derive(Debug)]
pub enum RetryError<E> {
    /// `max_attempts` attempts all failed with retryable errors
    Exhausted {
        attempts: u32,
        source: E,
        elapsed: Duration,
    },
    /// The predicate rejected the error of attempt `attempt`
    NonRetryable { attempt: u32, source: E },
    /// The token or deadline fired before the loop could finish
    ///
    /// `attempts` may be zero when the loop was stopped before the first
    /// call, in which case `last_error` is `None`.
    Cancelled {
        attempts: u32,
        last_error: Option<E>,
        reason: CancelReason,
    },
}

impl<E> RetryError<E> {
    pub fn exhausted(attempts: u32, source: E, elapsed: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            elapsed,
        }
    }

    pub fn non_retryable(attempt: u32, source: E) -> Self {
        RetryError::NonRetryable { attempt, source }
    }

    pub fn cancelled(attempts: u32, last_error: Option<E>, reason: CancelReason) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
            reason,
        }
    }

    /// How many times the operation was invoked
    pub fn attempts(&self) -> u32 {
        match *self {
            RetryError::Exhausted { attempts, .. } | RetryError::Cancelled { attempts, .. } => {
                attempts
            }
            RetryError::NonRetryable { attempt, .. } => attempt,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// True for both token cancellation and an expired deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RetryError::Cancelled { .. })
    }

    /// The last error the operation produced
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
        }
    }

    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } | RetryError::NonRetryable { source, .. } => {
                Some(source)
            }
            RetryError::Cancelled { last_error, .. } => last_error,
        }
    }

    /// Convert the operation error, keeping counts and reasons
    pub fn map_err<F, E2>(self, f: F) -> RetryError<E2>
    where
        F: FnOnce(E) -> E2,
    {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                elapsed,
            } => RetryError::exhausted(attempts, f(source), elapsed),
            RetryError::NonRetryable { attempt, source } => {
                RetryError::non_retryable(attempt, f(source))
            }
            RetryError::Cancelled {
                attempts,
                last_error,
                reason,
            } => RetryError::cancelled(attempts, last_error.map(f), reason),
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                elapsed,
            } => write!(
                f,
                "gave up after {} attempt(s) in {}ms: {}",
                attempts,
                elapsed.as_millis(),
                source
            ),
            RetryError::NonRetryable { attempt, source } => {
                write!(f, "attempt {} failed permanently: {}", attempt, source)
            }
            RetryError::Cancelled {
                attempts,
                last_error: Some(last),
                reason,
            } => write!(f, "{} after {} attempt(s): {}", reason, attempts, last),
            RetryError::Cancelled {
                attempts, reason, ..
            } => write!(f, "{} after {} attempt(s)", reason, attempts),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source_ref().map(|err| err as &(dyn Error + 'static))
    }
}
