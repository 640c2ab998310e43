//! Configuration loading and management

mod hierarchical_loader;

pub use hierarchical_loader::{HierarchicalConfigLoader, CONFIG_FILENAME, ENV_PREFIX};
