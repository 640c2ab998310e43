//! Resilience configuration types
//!
//! These types hold the plain parameters of the remote-operation engine:
//! retry policies per operation, circuit breaker settings per dependency,
//! and the policy used for rollback cleanup calls.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Complete resilience configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ResilienceConfig {
    /// Retry policy configurations
    #[serde(default)]
    pub retry_policies: RetryPoliciesConfig,

    /// Circuit breaker configurations
    #[serde(default)]
    pub circuit_breakers: CircuitBreakersConfig,

    /// Rollback cleanup settings
    #[serde(default)]
    pub rollback: RollbackConfig,
}

impl ResilienceConfig {
    /// Resolve the retry policy for an operation, falling back to the default
    pub fn policy_for(&self, operation: &str) -> &RetryPolicy {
        self.retry_policies
            .operations
            .get(operation)
            .unwrap_or(&self.retry_policies.default)
    }

    /// Resolve the breaker settings for a dependency, falling back to the default
    pub fn breaker_for(&self, dependency: &str) -> &CircuitBreakerConfig {
        self.circuit_breakers
            .dependencies
            .get(dependency)
            .unwrap_or(&self.circuit_breakers.default)
    }

    /// Validate every policy and breaker in the configuration
    pub fn validate(&self) -> Result<()> {
        validate_in("retry-policies.default", self.retry_policies.default.validate())?;
        for (name, policy) in sorted(&self.retry_policies.operations) {
            validate_in(
                &format!("retry-policies.operations.{}", name),
                policy.validate(),
            )?;
        }

        validate_in(
            "circuit-breakers.default",
            self.circuit_breakers.default.validate(),
        )?;
        for (name, breaker) in sorted(&self.circuit_breakers.dependencies) {
            validate_in(
                &format!("circuit-breakers.dependencies.{}", name),
                breaker.validate(),
            )?;
        }

        if self.rollback.breaker.trim().is_empty() {
            return Err(Error::invalid_configuration(
                "rollback.breaker must not be empty",
            ));
        }
        validate_in("rollback.retry", self.rollback.retry.validate())
    }
}

fn sorted<V>(map: &HashMap<String, V>) -> Vec<(&String, &V)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

fn validate_in(path: &str, result: Result<()>) -> Result<()> {
    result.map_err(|err| match err {
        Error::InvalidConfiguration { message } => {
            Error::invalid_configuration(format!("{}: {}", path, message))
        }
        other => other,
    })
}

/// Retry policies configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPoliciesConfig {
    /// Default retry policy
    #[serde(default)]
    pub default: RetryPolicy,

    /// Per-operation retry policies
    #[serde(default)]
    pub operations: HashMap<String, RetryPolicy>,
}

impl Default for RetryPoliciesConfig {
    fn default() -> Self {
        Self {
            default: RetryPolicy::default(),
            operations: HashMap::new(),
        }
    }
}

/// Retry policy for an operation
///
/// Construct through [`RetryPolicy::new`] or deserialize and call
/// [`RetryPolicy::validate`]; the retry executor builder refuses invalid
/// policies either way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Retry strategy
    #[serde(default)]
    pub strategy: RetryStrategy,

    /// Backoff multiplier for exponential strategies
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Base delay in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Randomize each delay by a factor in [0.5, 1.5)
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            strategy: RetryStrategy::default(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl RetryPolicy {
    /// Create a validated exponential-backoff policy
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Result<Self> {
        let policy = Self {
            max_attempts,
            initial_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: max_delay.as_millis() as u64,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Replace the backoff multiplier
    pub fn with_multiplier(mut self, multiplier: f64) -> Result<Self> {
        self.backoff_multiplier = multiplier;
        self.validate()?;
        Ok(self)
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Replace the delay strategy
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Base delay as a duration
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    /// Delay cap as a duration
    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    /// Check the policy parameters
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::invalid_configuration(
                "max-attempts must be at least 1",
            ));
        }
        if self.initial_delay_ms == 0 {
            return Err(Error::invalid_configuration(
                "initial-delay-ms must be greater than zero",
            ));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(Error::invalid_configuration(format!(
                "max-delay-ms ({}) must not be lower than initial-delay-ms ({})",
                self.max_delay_ms, self.initial_delay_ms
            )));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(Error::invalid_configuration(format!(
                "backoff-multiplier must be a finite number >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    30000
}
fn default_jitter() -> bool {
    true
}

/// Retry strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RetryStrategy {
    /// Retry without waiting
    None,

    /// Fixed delay between retries
    FixedDelay,

    /// Exponential backoff (default)
    #[default]
    ExponentialBackoff,

    /// Linear backoff
    LinearBackoff,
}

impl std::fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryStrategy::None => write!(f, "none"),
            RetryStrategy::FixedDelay => write!(f, "fixed-delay"),
            RetryStrategy::ExponentialBackoff => write!(f, "exponential-backoff"),
            RetryStrategy::LinearBackoff => write!(f, "linear-backoff"),
        }
    }
}

/// Circuit breakers configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CircuitBreakersConfig {
    /// Settings used for dependencies without an override
    #[serde(default)]
    pub default: CircuitBreakerConfig,

    /// Per-dependency overrides, keyed by breaker name
    #[serde(default)]
    pub dependencies: HashMap<String, CircuitBreakerConfig>,
}

/// Settings for a single circuit breaker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Successful half-open probes needed to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Cool-down before an open circuit admits a probe, in milliseconds
    #[serde(default = "default_reset_timeout")]
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            reset_timeout_ms: default_reset_timeout(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create validated breaker settings
    pub fn new(
        failure_threshold: u32,
        success_threshold: u32,
        reset_timeout: Duration,
    ) -> Result<Self> {
        let config = Self {
            failure_threshold,
            success_threshold,
            reset_timeout_ms: reset_timeout.as_millis() as u64,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cool-down as a duration
    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    /// Check the breaker parameters
    pub fn validate(&self) -> Result<()> {
        if self.failure_threshold == 0 {
            return Err(Error::invalid_configuration(
                "failure-threshold must be at least 1",
            ));
        }
        if self.success_threshold == 0 {
            return Err(Error::invalid_configuration(
                "success-threshold must be at least 1",
            ));
        }
        if self.reset_timeout_ms == 0 {
            return Err(Error::invalid_configuration(
                "reset-timeout-ms must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_success_threshold() -> u32 {
    1
}
fn default_reset_timeout() -> u64 {
    30000
}

/// Rollback cleanup settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RollbackConfig {
    /// Breaker that cleanup calls are accounted under
    ///
    /// The breaker is shared by every transaction built on the same registry:
    /// once one rollback trips it, cleanups in other transactions fail fast
    /// until its reset timeout elapses. Resources registered with their own
    /// breaker are not affected.
    #[serde(default = "default_rollback_breaker")]
    pub breaker: String,

    /// Retry policy applied to each cleanup call
    #[serde(default = "default_rollback_retry")]
    pub retry: RetryPolicy,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            breaker: default_rollback_breaker(),
            retry: default_rollback_retry(),
        }
    }
}

fn default_rollback_breaker() -> String {
    "cleanup".to_string()
}

fn default_rollback_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_delay_ms: 1000,
        max_delay_ms: 60000,
        ..RetryPolicy::default()
    }
}
