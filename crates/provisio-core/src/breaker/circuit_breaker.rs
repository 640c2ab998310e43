//! Named circuit breaker
//!
//! A breaker guards one remote dependency. It counts consecutive failures
//! while Closed, rejects calls while Open, and lets exactly one probe through
//! while HalfOpen. The Open to HalfOpen transition is lazy: it happens on the
//! first call after the reset timeout, not on a timer.
//!
//! All state lives behind a `std::sync::Mutex` that is never held across an
//! `.await`. Callers obtain a [`BreakerPermit`] before touching the
//! dependency and settle it with the outcome afterwards.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use crate::error::Result;
use crate::types::CircuitBreakerConfig;

use super::state::{BreakerSnapshot, CircuitState};

/// Returned when a breaker refuses a call without invoking it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitOpenError {
    /// Name of the rejecting breaker
    pub breaker: String,
    /// The breaker is HalfOpen and another caller holds the probe slot
    pub probe_in_flight: bool,
    /// Cool-down left before a probe is allowed, when known
    pub retry_after: Option<Duration>,
}

impl fmt::Display for CircuitOpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.probe_in_flight {
            return write!(
                f,
                "circuit breaker '{}' is half-open with a probe in flight",
                self.breaker
            );
        }
        match self.retry_after {
            Some(wait) => write!(
                f,
                "circuit breaker '{}' is open (retry in {}ms)",
                self.breaker,
                wait.as_millis()
            ),
            None => write!(f, "circuit breaker '{}' is open", self.breaker),
        }
    }
}

impl std::error::Error for CircuitOpenError {}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32, probe_in_flight: bool },
}

#[derive(Debug)]
struct Inner {
    phase: Phase,
    /// Bumped whenever the breaker leaves a phase for good (trip, recovery,
    /// reset); permits from an older generation are ignored
    generation: u64,
    times_opened: u64,
    rejected_calls: u64,
}

/// A circuit breaker for one named dependency
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    /// Create a Closed breaker, rejecting invalid thresholds
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_validated(name.into(), config))
    }

    pub(super) fn with_validated(name: String, config: CircuitBreakerConfig) -> Self {
        Self {
            name,
            config,
            inner: Mutex::new(Inner {
                phase: Phase::Closed { failures: 0 },
                generation: 0,
                times_opened: 0,
                rejected_calls: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // every critical section leaves `Inner` consistent
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current state without triggering the lazy HalfOpen transition
    pub fn state(&self) -> CircuitState {
        match self.lock().phase {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Ask permission to call the dependency
    ///
    /// Closed always admits. Open rejects until the reset timeout has
    /// elapsed, after which this caller becomes the HalfOpen probe. HalfOpen
    /// admits only when no other probe is in flight.
    pub fn try_acquire(&self) -> std::result::Result<BreakerPermit<'_>, CircuitOpenError> {
        let mut inner = self.lock();

        match inner.phase {
            Phase::Closed { .. } => Ok(BreakerPermit::new(self, inner.generation, false)),

            Phase::Open { opened_at } => {
                let elapsed = opened_at.elapsed();
                let reset_timeout = self.config.reset_timeout();
                if elapsed < reset_timeout {
                    inner.rejected_calls += 1;
                    tracing::debug!(breaker = %self.name, "rejecting call, circuit open");
                    return Err(self.open_error(false, Some(reset_timeout - elapsed)));
                }

                inner.phase = Phase::HalfOpen {
                    successes: 0,
                    probe_in_flight: true,
                };
                tracing::info!(breaker = %self.name, "circuit half-open, probing dependency");
                Ok(BreakerPermit::new(self, inner.generation, true))
            }

            Phase::HalfOpen {
                successes,
                probe_in_flight,
            } => {
                if probe_in_flight {
                    inner.rejected_calls += 1;
                    tracing::debug!(breaker = %self.name, "rejecting call, probe in flight");
                    return Err(self.open_error(true, None));
                }

                inner.phase = Phase::HalfOpen {
                    successes,
                    probe_in_flight: true,
                };
                Ok(BreakerPermit::new(self, inner.generation, true))
            }
        }
    }

    /// Run `op` under the breaker
    ///
    /// Rejections surface through `E: From<CircuitOpenError>`. Every error
    /// returned by `op` is recorded as a failure.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<CircuitOpenError>,
    {
        let permit = self.try_acquire()?;
        let result = op().await;
        match &result {
            Ok(_) => permit.record_success(),
            Err(_) => permit.record_failure(),
        }
        result
    }

    /// Force the breaker back to Closed with cleared counters
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.phase = Phase::Closed { failures: 0 };
        inner.generation += 1;
        tracing::info!(breaker = %self.name, "circuit manually reset");
    }

    /// Serializable view of the current state
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        let (state, failure_count, success_count, probe_in_flight, retry_after) = match inner.phase
        {
            Phase::Closed { failures } => (CircuitState::Closed, failures, 0, false, None),
            Phase::Open { opened_at } => {
                let remaining = self.config.reset_timeout().saturating_sub(opened_at.elapsed());
                (CircuitState::Open, 0, 0, false, Some(remaining))
            }
            Phase::HalfOpen {
                successes,
                probe_in_flight,
            } => (CircuitState::HalfOpen, 0, successes, probe_in_flight, None),
        };

        BreakerSnapshot {
            name: self.name.clone(),
            state,
            failure_count,
            success_count,
            probe_in_flight,
            retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            times_opened: inner.times_opened,
            rejected_calls: inner.rejected_calls,
        }
    }

    fn open_error(&self, probe_in_flight: bool, retry_after: Option<Duration>) -> CircuitOpenError {
        CircuitOpenError {
            breaker: self.name.clone(),
            probe_in_flight,
            retry_after,
        }
    }

    fn trip(&self, inner: &mut Inner) {
        inner.phase = Phase::Open {
            opened_at: Instant::now(),
        };
        inner.times_opened += 1;
        inner.generation += 1;
    }

    fn on_success(&self, generation: u64, probe: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(breaker = %self.name, "ignoring outcome from an earlier phase");
            return;
        }
        match inner.phase {
            Phase::Closed { .. } if !probe => {
                inner.phase = Phase::Closed { failures: 0 };
            }
            Phase::HalfOpen {
                successes,
                probe_in_flight: true,
            } if probe => {
                let successes = successes + 1;
                if successes >= self.config.success_threshold {
                    inner.phase = Phase::Closed { failures: 0 };
                    inner.generation += 1;
                    tracing::info!(breaker = %self.name, "circuit closed, dependency recovered");
                } else {
                    inner.phase = Phase::HalfOpen {
                        successes,
                        probe_in_flight: false,
                    };
                    tracing::debug!(
                        breaker = %self.name,
                        successes = successes,
                        required = self.config.success_threshold,
                        "probe succeeded"
                    );
                }
            }
            _ => {}
        }
    }

    fn on_failure(&self, generation: u64, probe: bool) {
        let mut inner = self.lock();
        if inner.generation != generation {
            tracing::debug!(breaker = %self.name, "ignoring outcome from an earlier phase");
            return;
        }
        match inner.phase {
            Phase::Closed { failures } if !probe => {
                let failures = failures + 1;
                if failures >= self.config.failure_threshold {
                    self.trip(&mut inner);
                    tracing::warn!(
                        breaker = %self.name,
                        failures = failures,
                        reset_timeout_ms = self.config.reset_timeout_ms,
                        "circuit opened"
                    );
                } else {
                    inner.phase = Phase::Closed { failures };
                }
            }
            Phase::HalfOpen {
                probe_in_flight: true,
                ..
            } if probe => {
                self.trip(&mut inner);
                tracing::warn!(breaker = %self.name, "probe failed, circuit re-opened");
            }
            _ => {}
        }
    }

    fn release_probe(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }
        if let Phase::HalfOpen {
            successes,
            probe_in_flight: true,
        } = inner.phase
        {
            inner.phase = Phase::HalfOpen {
                successes,
                probe_in_flight: false,
            };
            tracing::debug!(breaker = %self.name, "probe abandoned, slot released");
        }
    }
}

/// Admission ticket for one call through a breaker
///
/// Settle it with [`record_success`](Self::record_success) or
/// [`record_failure`](Self::record_failure). Dropping an unsettled permit
/// leaves the counters untouched and frees the probe slot if it held one.
/// A permit settled after the breaker tripped, recovered or was reset
/// changes nothing.
#[must_use = "an unsettled permit records nothing"]
#[derive(Debug)]
pub struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    settled: bool,
}

impl<'a> BreakerPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, generation: u64, probe: bool) -> Self {
        Self {
            breaker,
            generation,
            probe,
            settled: false,
        }
    }

    /// This call is the HalfOpen probe
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.generation, self.probe);
    }

    pub fn record_failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.generation, self.probe);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe(self.generation);
        }
    }
}
