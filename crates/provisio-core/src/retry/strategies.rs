//! Backoff delays and retryability predicates

use std::time::Duration;

use rand::Rng;

use crate::types::{RetryPolicy, RetryStrategy};

/// Lower bound of the jitter factor (inclusive)
pub const JITTER_MIN: f64 = 0.5;

/// Upper bound of the jitter factor (exclusive)
pub const JITTER_MAX: f64 = 1.5;

/// Status codes retried by [`HttpStatusPredicate::default_http`]
const DEFAULT_RETRYABLE_STATUS: [u16; 7] = [408, 425, 429, 500, 502, 503, 504];

/// Wait before the attempt following `attempt` (1-indexed)
///
/// The strategy's raw delay is capped at `max_delay_ms` first. Jitter, when
/// enabled, scales the capped value by a factor in `[0.5, 1.5)`, so a
/// jittered delay may exceed the cap by up to half.
///
/// ```rust
/// use provisio_core::retry::calculate_delay;
/// use provisio_core::types::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new(3, Duration::from_millis(1000), Duration::from_secs(30))
///     .unwrap()
///     .with_jitter(false);
///
/// assert_eq!(calculate_delay(&policy, 1), Duration::from_millis(1000));
/// assert_eq!(calculate_delay(&policy, 2), Duration::from_millis(2000));
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    // f64 saturates to infinity on huge exponents; min() then yields the cap
    let capped_ms = uncapped_ms(policy, attempt).min(policy.max_delay_ms as f64);
    let delay = Duration::from_millis(capped_ms as u64);

    if !policy.jitter || delay.is_zero() {
        return delay;
    }
    delay.mul_f64(rand::rng().random_range(JITTER_MIN..JITTER_MAX))
}

fn uncapped_ms(policy: &RetryPolicy, attempt: u32) -> f64 {
    let attempt = attempt.max(1);
    let initial = policy.initial_delay_ms as f64;

    match policy.strategy {
        RetryStrategy::None => 0.0,
        RetryStrategy::FixedDelay => initial,
        RetryStrategy::LinearBackoff => initial * f64::from(attempt),
        RetryStrategy::ExponentialBackoff => {
            initial * policy.backoff_multiplier.powf(f64::from(attempt - 1))
        }
    }
}

/// Decides whether a failed attempt may be retried
///
/// A rejected error ends the loop immediately. Any `Fn(&E) -> bool` closure
/// is a predicate:
///
/// ```rust
/// use provisio_core::retry::RetryExecutorBuilder;
/// use std::io;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_predicate(|err: &io::Error| err.kind() != io::ErrorKind::PermissionDenied)
///     .build()
///     .unwrap();
/// ```
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    fn should_retry(&self, error: &E) -> bool;
}

impl<E, F> RetryPredicate<E> for F
where
    E: ?Sized,
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        self(error)
    }
}

/// Treats every error as transient
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// Treats every error as permanent; the operation runs exactly once
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl<E: ?Sized> RetryPredicate<E> for NeverRetry {
    fn should_retry(&self, _error: &E) -> bool {
        false
    }
}

/// Errors that may carry the HTTP status of a failed remote call
pub trait HttpStatusError {
    /// `None` when no response arrived (timeout, reset, refused connection)
    fn status_code(&self) -> Option<u16>;
}

/// Retries throttling, timeouts and server-side failures
///
/// Errors without a status are transport failures and always retried.
/// Client errors such as 400, 403 or 404 stop the loop.
#[derive(Debug, Clone)]
pub struct HttpStatusPredicate {
    retryable: Vec<u16>,
}

impl HttpStatusPredicate {
    /// 408, 425, 429, 500, 502, 503 and 504
    pub fn default_http() -> Self {
        Self::with_codes(DEFAULT_RETRYABLE_STATUS)
    }

    pub fn with_codes(codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            retryable: codes.into_iter().collect(),
        }
    }

    pub fn is_retryable_code(&self, code: u16) -> bool {
        self.retryable.contains(&code)
    }
}

impl Default for HttpStatusPredicate {
    fn default() -> Self {
        Self::default_http()
    }
}

impl<E: HttpStatusError + ?Sized> RetryPredicate<E> for HttpStatusPredicate {
    fn should_retry(&self, error: &E) -> bool {
        error.status_code().is_none_or(|code| self.is_retryable_code(code))
    }
}
