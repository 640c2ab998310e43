//! Type definitions for the resilience engine configuration

mod resilience_config;

pub use resilience_config::*;
