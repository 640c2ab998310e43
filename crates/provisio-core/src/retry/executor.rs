//! The retry loop
//!
//! [`RetryExecutor::execute`] calls an operation until it succeeds, the
//! predicate rejects an error, the policy runs out of attempts, or the
//! caller stops it through a [`CancellationToken`] or a deadline.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::RetryPolicy;

use super::error::{CancelReason, RetryError};
use super::observer::{NoOpObserver, RetryEvent, RetryObserver};
use super::strategies::{calculate_delay, AlwaysRetry, RetryPredicate};

/// Caller-side ways to stop a loop early
#[derive(Debug, Clone, Default)]
struct StopSignals {
    token: Option<CancellationToken>,
    deadline: Option<Instant>,
}

impl StopSignals {
    fn triggered(&self) -> Option<CancelReason> {
        if self.token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            Some(CancelReason::Cancelled)
        } else if self.deadline.is_some_and(|at| Instant::now() >= at) {
            Some(CancelReason::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Sleep for `delay`, waking early if a signal fires
    async fn sleep(&self, delay: Duration) -> std::result::Result<(), CancelReason> {
        if let Some(reason) = self.triggered() {
            return Err(reason);
        }
        if delay.is_zero() {
            return Ok(());
        }

        let token = async {
            match &self.token {
                Some(token) => token.cancelled().await,
                None => std::future::pending().await,
            }
        };
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = token => Err(CancelReason::Cancelled),
            _ = deadline => Err(CancelReason::DeadlineExceeded),
            _ = tokio::time::sleep(delay) => Ok(()),
        }
    }
}

/// Assembles a [`RetryExecutor`]; the policy is validated by [`build`](Self::build)
///
/// ```rust
/// use provisio_core::retry::{HttpStatusPredicate, RetryExecutorBuilder, TracingObserver};
/// use provisio_core::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_predicate(HttpStatusPredicate::default_http())
///     .with_observer(TracingObserver::new("create-workspace"))
///     .build()
///     .expect("default policy is valid");
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    draft: RetryExecutor<P, O>,
}

impl Default for RetryExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder {
    /// Default policy, every error retryable, no observer
    pub fn new() -> Self {
        Self {
            draft: RetryExecutor {
                policy: RetryPolicy::default(),
                predicate: AlwaysRetry,
                observer: NoOpObserver,
                stop: StopSignals::default(),
            },
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.draft.policy = policy;
        self
    }

    /// Decide which errors are worth another attempt
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        let RetryExecutor {
            policy,
            observer,
            stop,
            ..
        } = self.draft;
        RetryExecutorBuilder {
            draft: RetryExecutor {
                policy,
                predicate,
                observer,
                stop,
            },
        }
    }

    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        let RetryExecutor {
            policy,
            predicate,
            stop,
            ..
        } = self.draft;
        RetryExecutorBuilder {
            draft: RetryExecutor {
                policy,
                predicate,
                observer,
                stop,
            },
        }
    }

    /// Stop between attempts once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.draft.stop.token = Some(token);
        self
    }

    /// Stop between attempts once `deadline` has passed
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.draft.stop.deadline = Some(deadline);
        self
    }

    pub fn build(self) -> Result<RetryExecutor<P, O>> {
        self.draft.policy.validate()?;
        Ok(self.draft)
    }
}

/// Runs operations under one validated [`RetryPolicy`]
///
/// Executors carry no state between calls, so one instance can serve any
/// number of sequential or concurrent `execute` calls.
#[derive(Debug, Clone)]
pub struct RetryExecutor<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    stop: StopSignals,
}

impl RetryExecutor {
    /// Retry every error under `policy`
    pub fn from_policy(policy: RetryPolicy) -> Result<Self> {
        RetryExecutorBuilder::new().with_policy(policy).build()
    }
}

impl<P, O> RetryExecutor<P, O> {
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

impl<P, O: RetryObserver> RetryExecutor<P, O> {
    /// Call `op` until it succeeds or the loop has to give up
    ///
    /// The first attempt starts immediately. A failed attempt is retried
    /// after [`calculate_delay`] when the predicate accepts the error and
    /// attempts remain. Stop signals are checked before every attempt and
    /// interrupt the backoff sleep; an attempt already running is never
    /// interrupted.
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> std::result::Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: fmt::Display,
        P: RetryPredicate<E>,
    {
        let started = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let mut previous: Option<E> = None;
        let mut attempt = 0;

        loop {
            if let Some(reason) = self.stop.triggered() {
                return Err(self.cancelled(attempt, previous, reason));
            }
            attempt += 1;

            self.observer.observe(&RetryEvent::AttemptStarted {
                attempt,
                max_attempts,
            });
            let err = match op().await {
                Ok(value) => {
                    self.observer.observe(&RetryEvent::Succeeded {
                        attempts: attempt,
                        elapsed: started.elapsed(),
                    });
                    return Ok(value);
                }
                Err(err) => err,
            };

            if !self.predicate.should_retry(&err) {
                self.observer.observe(&RetryEvent::NonRetryable {
                    attempt,
                    error: &err,
                });
                return Err(RetryError::non_retryable(attempt, err));
            }
            if attempt >= max_attempts {
                self.observer.observe(&RetryEvent::Exhausted {
                    attempts: attempt,
                    error: &err,
                });
                return Err(RetryError::exhausted(attempt, err, started.elapsed()));
            }

            let delay = calculate_delay(&self.policy, attempt);
            self.observer.observe(&RetryEvent::AttemptFailed {
                attempt,
                error: &err,
                delay,
            });
            if let Err(reason) = self.stop.sleep(delay).await {
                return Err(self.cancelled(attempt, Some(err), reason));
            }
            previous = Some(err);
        }
    }

    fn cancelled<E>(&self, attempts: u32, last: Option<E>, reason: CancelReason) -> RetryError<E> {
        self.observer.observe(&RetryEvent::Cancelled { attempts, reason });
        RetryError::cancelled(attempts, last, reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RetryStrategy;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Records the debug form of every event in order
    #[derive(Default)]
    struct Transcript(Mutex<Vec<String>>);

    impl RetryObserver for Transcript {
        fn observe(&self, event: &RetryEvent<'_>) {
            self.0.lock().unwrap().push(format!("{:?}", event));
        }
    }

    impl Transcript {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    fn fixed_10ms(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            strategy: RetryStrategy::FixedDelay,
            backoff_multiplier: 2.0,
            initial_delay_ms: 10,
            max_delay_ms: 100,
            jitter: false,
        }
    }

    #[test]
    fn test_build_validates_policy() {
        let zero_attempts = RetryExecutorBuilder::new()
            .with_policy(fixed_10ms(0))
            .build();
        assert!(zero_attempts.unwrap_err().is_invalid_configuration());

        let executor = RetryExecutor::from_policy(fixed_10ms(2)).unwrap();
        assert_eq!(executor.policy().max_attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_sequence_for_recovered_call() {
        let transcript = Arc::new(Transcript::default());
        let mut calls = 0;

        let value = RetryExecutorBuilder::new()
            .with_policy(fixed_10ms(3))
            .with_observer(transcript.clone())
            .build()
            .unwrap()
            .execute(|| {
                calls += 1;
                let outcome = if calls < 2 {
                    Err(io::Error::other("HTTP 503"))
                } else {
                    Ok(calls)
                };
                async move { outcome }
            })
            .await
            .unwrap();

        assert_eq!(value, 2);
        assert_eq!(
            transcript.lines(),
            vec![
                "AttemptStarted(1/3)",
                "AttemptFailed(1, HTTP 503, 10ms)",
                "AttemptStarted(2/3)",
                "Succeeded(2)",
            ]
        );
    }

    #[tokio::test]
    async fn test_event_sequence_for_single_attempt_policy() {
        let transcript = Arc::new(Transcript::default());

        let err = RetryExecutorBuilder::new()
            .with_policy(fixed_10ms(1))
            .with_observer(transcript.clone())
            .build()
            .unwrap()
            .execute(|| async { Err::<(), _>(io::Error::other("HTTP 500")) })
            .await
            .unwrap_err();

        assert!(err.is_exhausted());
        assert_eq!(
            transcript.lines(),
            vec!["AttemptStarted(1/1)", "Exhausted(1, HTTP 500)"]
        );
    }

    #[tokio::test]
    async fn test_rejected_error_is_reported_once() {
        let transcript = Arc::new(Transcript::default());

        let err = RetryExecutorBuilder::new()
            .with_policy(fixed_10ms(3))
            .with_predicate(|err: &io::Error| err.kind() != io::ErrorKind::NotFound)
            .with_observer(transcript.clone())
            .build()
            .unwrap()
            .execute(|| async { Err::<(), _>(io::Error::from(io::ErrorKind::NotFound)) })
            .await
            .unwrap_err();

        assert!(err.is_non_retryable());
        let lines = transcript.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("NonRetryable(1"));
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_the_call() {
        let token = CancellationToken::new();
        token.cancel();
        let transcript = Arc::new(Transcript::default());
        let mut calls = 0;

        let err = RetryExecutorBuilder::new()
            .with_policy(fixed_10ms(3))
            .with_cancellation(token)
            .with_observer(transcript.clone())
            .build()
            .unwrap()
            .execute(|| {
                calls += 1;
                async { Ok::<_, io::Error>(()) }
            })
            .await
            .unwrap_err();

        assert_eq!(calls, 0);
        assert!(matches!(
            err,
            RetryError::Cancelled {
                attempts: 0,
                last_error: None,
                reason: CancelReason::Cancelled,
            }
        ));
        assert_eq!(transcript.lines(), vec!["Cancelled(0, cancelled)"]);
    }
}
