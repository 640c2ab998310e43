//! CLI command implementations

pub mod config;
pub mod simulate;

use anyhow::Result;
use camino::Utf8Path;
use provisio_core::types::ResilienceConfig;
use provisio_core::HierarchicalConfigLoader;

/// Load the effective resilience configuration, layering `--config` if given
pub(crate) fn load_config(path: Option<&Utf8Path>) -> Result<ResilienceConfig> {
    let mut loader = HierarchicalConfigLoader::new()?;
    if let Some(path) = path {
        loader = loader.with_override_file(path);
    }
    Ok(loader.load()?)
}
