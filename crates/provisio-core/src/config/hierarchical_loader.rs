//! Layered resilience configuration
//!
//! Later layers win:
//! 1. `resilience-defaults.yaml` compiled into the binary
//! 2. `~/.provisio/resilience.yaml`
//! 3. A file named by the caller, e.g. `--config` on the CLI
//! 4. `PROVISIO_*` environment variables
//!
//! YAML documents are deep-merged key by key, so an overlay only needs to
//! spell out the values it changes.

use crate::error::{Error, Result};
use crate::types::ResilienceConfig;
use camino::{Utf8Path, Utf8PathBuf};
use rust_embed::RustEmbed;
use serde_yaml_ng::{Mapping, Value};
use std::env::{self, VarError};
use std::fs;
use std::str::FromStr;

/// Name of the resilience config file inside the config directory
pub const CONFIG_FILENAME: &str = "resilience.yaml";

/// Prefix of environment variable overrides
pub const ENV_PREFIX: &str = "PROVISIO_";

const EMBEDDED_DEFAULTS: &str = "resilience-defaults.yaml";

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/../../embedded/config/"]
#[prefix = ""]
struct Defaults;

/// Builds a validated [`ResilienceConfig`] out of every layer that exists
pub struct HierarchicalConfigLoader {
    config_dir: Utf8PathBuf,
    override_file: Option<Utf8PathBuf>,
}

impl HierarchicalConfigLoader {
    /// Read user overrides from `~/.provisio`
    pub fn new() -> Result<Self> {
        Ok(Self::with_dir(home_config_dir()?))
    }

    /// Read user overrides from `config_dir` instead of the home directory
    pub fn with_dir(config_dir: Utf8PathBuf) -> Self {
        Self {
            config_dir,
            override_file: None,
        }
    }

    /// The file must exist when [`load`](Self::load) runs
    pub fn with_override_file(mut self, path: impl Into<Utf8PathBuf>) -> Self {
        self.override_file = Some(path.into());
        self
    }

    /// Merge every layer, then validate the result
    pub fn load(&self) -> Result<ResilienceConfig> {
        let mut document = defaults_document()?;

        let user_file = self.config_dir.join(CONFIG_FILENAME);
        if user_file.exists() {
            tracing::debug!(path = %user_file, "merging user resilience config");
            merge_values(&mut document, read_document(&user_file)?);
        }

        if let Some(path) = &self.override_file {
            if !path.exists() {
                return Err(Error::config_not_found(path.as_str()));
            }
            tracing::debug!(path = %path, "merging resilience config from --config");
            merge_values(&mut document, read_document(path)?);
        }

        let mut config: ResilienceConfig = serde_yaml_ng::from_value(document)
            .map_err(|e| Error::invalid_configuration(format!("Malformed config: {}", e)))?;
        Self::apply_env_overrides(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    /// The compiled-in layer on its own, without validation
    pub fn embedded_defaults() -> Result<ResilienceConfig> {
        serde_yaml_ng::from_value(defaults_document()?).map_err(|e| {
            Error::invalid_configuration(format!("{} is malformed: {}", EMBEDDED_DEFAULTS, e))
        })
    }

    /// Only the default policy and the default breaker can be tuned this way
    fn apply_env_overrides(config: &mut ResilienceConfig) -> Result<()> {
        let retry = &mut config.retry_policies.default;
        if let Some(val) = env_override("RETRY_MAX_ATTEMPTS")? {
            retry.max_attempts = val;
        }
        if let Some(val) = env_override("RETRY_INITIAL_DELAY_MS")? {
            retry.initial_delay_ms = val;
        }
        if let Some(val) = env_override("RETRY_MAX_DELAY_MS")? {
            retry.max_delay_ms = val;
        }
        if let Some(val) = env_override("RETRY_JITTER")? {
            retry.jitter = val;
        }

        let breaker = &mut config.circuit_breakers.default;
        if let Some(val) = env_override("BREAKER_FAILURE_THRESHOLD")? {
            breaker.failure_threshold = val;
        }
        if let Some(val) = env_override("BREAKER_SUCCESS_THRESHOLD")? {
            breaker.success_threshold = val;
        }
        if let Some(val) = env_override("BREAKER_RESET_TIMEOUT_MS")? {
            breaker.reset_timeout_ms = val;
        }
        Ok(())
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }
}

fn home_config_dir() -> Result<Utf8PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::invalid_configuration("Home directory is unknown"))?;
    Utf8PathBuf::from_path_buf(home)
        .map(|home| home.join(".provisio"))
        .map_err(|path| {
            Error::invalid_configuration(format!("{} is not a UTF-8 path", path.display()))
        })
}

fn defaults_document() -> Result<Value> {
    let file = Defaults::get(EMBEDDED_DEFAULTS)
        .ok_or_else(|| Error::config_not_found(format!("embedded {}", EMBEDDED_DEFAULTS)))?;
    serde_yaml_ng::from_slice(&file.data).map_err(|e| Error::yaml_parse(EMBEDDED_DEFAULTS, e))
}

fn read_document(path: &Utf8Path) -> Result<Value> {
    let text = fs::read_to_string(path)?;
    serde_yaml_ng::from_str(&text)
        .map_err(|e| Error::yaml_parse(path.as_str(), e))
}

/// Read and parse `PROVISIO_<suffix>` if it is set
fn env_override<T: FromStr>(suffix: &str) -> Result<Option<T>> {
    let name = format!("{}{}", ENV_PREFIX, suffix);
    match env::var(&name) {
        Ok(val) => val.trim().parse().map(Some).map_err(|_| {
            Error::invalid_configuration(format!("{} has an invalid value: {:?}", name, val))
        }),
        Err(VarError::NotPresent) => Ok(None),
        Err(VarError::NotUnicode(raw)) => Err(Error::invalid_configuration(format!(
            "{} is not valid UTF-8: {:?}",
            name, raw
        ))),
    }
}

/// Deep-merge `overlay` into `base`; mappings merge per key, anything else replaces
fn merge_values(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            merge_mappings(base_map, overlay_map);
        }
        (_, Value::Null) => {}
        (base, overlay) => *base = overlay,
    }
}

fn merge_mappings(base: &mut Mapping, overlay: Mapping) {
    for (key, value) in overlay {
        match base.get_mut(&key) {
            Some(existing) => merge_values(existing, value),
            None => {
                base.insert(key, value);
            }
        }
    }
}
