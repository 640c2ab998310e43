//! Process-wide collection of named circuit breakers

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::types::{CircuitBreakerConfig, CircuitBreakersConfig};

use super::circuit_breaker::CircuitBreaker;
use super::state::BreakerSnapshot;

/// Registry mapping dependency names to shared breakers
///
/// Breakers are created lazily on first lookup and live as long as the
/// registry, so failure history survives across workflows. Share the
/// registry with `Arc` and hand it to every `OperationExecutor`.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    default_config: CircuitBreakerConfig,
    overrides: HashMap<String, CircuitBreakerConfig>,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self {
            default_config: CircuitBreakerConfig::default(),
            overrides: HashMap::new(),
            breakers: Mutex::new(HashMap::new()),
        }
    }
}

impl CircuitBreakerRegistry {
    /// Registry where every breaker uses `default_config`
    pub fn new(default_config: CircuitBreakerConfig) -> Result<Self> {
        default_config.validate()?;
        Ok(Self {
            default_config,
            ..Self::default()
        })
    }

    /// Registry built from the `circuit-breakers` configuration section
    pub fn from_config(config: &CircuitBreakersConfig) -> Result<Self> {
        config
            .dependencies
            .iter()
            .try_fold(Self::new(config.default.clone())?, |registry, (name, cfg)| {
                registry.with_override(name.clone(), cfg.clone())
            })
    }

    /// Use `config` for the breaker named `name` instead of the default
    pub fn with_override(
        mut self,
        name: impl Into<String>,
        config: CircuitBreakerConfig,
    ) -> Result<Self> {
        let name = name.into();
        config.validate().map_err(|e| {
            Error::invalid_configuration(format!("circuit-breakers.{}: {}", name, e))
        })?;
        self.overrides.insert(name, config);
        Ok(self)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<CircuitBreaker>>> {
        self.breakers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Settings a breaker named `name` is (or will be) created with
    pub fn config_for(&self, name: &str) -> &CircuitBreakerConfig {
        self.overrides.get(name).unwrap_or(&self.default_config)
    }

    /// Get the breaker for `name`, creating it on first use
    pub fn get(&self, name: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.lock();
        if let Some(breaker) = breakers.get(name) {
            return Arc::clone(breaker);
        }

        tracing::debug!(breaker = name, "creating circuit breaker");
        let breaker = Arc::new(CircuitBreaker::with_validated(
            name.to_string(),
            self.config_for(name).clone(),
        ));
        breakers.insert(name.to_string(), Arc::clone(&breaker));
        breaker
    }

    /// Snapshots of every breaker created so far, sorted by name
    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> = self.lock().values().cloned().collect();
        let mut snapshots: Vec<BreakerSnapshot> = breakers.iter().map(|b| b.snapshot()).collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    /// Close every breaker
    pub fn reset_all(&self) {
        let breakers: Vec<Arc<CircuitBreaker>> = self.lock().values().cloned().collect();
        for breaker in breakers {
            breaker.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
