//! Circuit breaker states and read-only snapshots

use std::fmt;

use serde::Serialize;

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Calls pass through; failures are counted
    Closed,
    /// Calls are rejected until the reset timeout elapses
    Open,
    /// A single probe call decides whether the dependency has recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Point-in-time view of a breaker, suitable for status output
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    /// Consecutive failures while Closed
    pub failure_count: u32,
    /// Successful probes while HalfOpen
    pub success_count: u32,
    pub probe_in_flight: bool,
    /// Cool-down left while Open; zero once the next call may probe
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
    /// How many times the breaker has tripped open
    pub times_opened: u64,
    /// Calls rejected without reaching the dependency
    pub rejected_calls: u64,
}

impl BreakerSnapshot {
    pub fn is_closed(&self) -> bool {
        self.state == CircuitState::Closed
    }
}
