//! Per-dependency circuit breaking
//!
//! - [`CircuitBreaker`]: Closed / Open / HalfOpen state machine for one dependency
//! - [`CircuitBreakerRegistry`]: lazily created, process-wide breakers keyed by name
//! - [`BreakerSnapshot`]: serializable state for status output

mod circuit_breaker;
mod registry;
mod state;

pub use circuit_breaker::{BreakerPermit, CircuitBreaker, CircuitOpenError};
pub use registry::CircuitBreakerRegistry;
pub use state::{BreakerSnapshot, CircuitState};
