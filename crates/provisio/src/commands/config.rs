//! Config command

use anyhow::Result;
use camino::Utf8Path;

use crate::cli::{ConfigCommands, ConfigShowArgs};
use crate::commands::load_config;
use crate::output;

pub async fn run(cmd: ConfigCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => show(args, config_path),
        ConfigCommands::Validate => validate(config_path),
    }
}

fn show(args: ConfigShowArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;

    if args.json {
        let json = serde_json::to_string_pretty(&config)?;
        println!("{}", json);
    } else {
        let yaml = serde_yaml_ng::to_string(&config)?;
        println!("{}", yaml);
    }

    Ok(())
}

fn validate(config_path: Option<&Utf8Path>) -> Result<()> {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            output::error("Configuration is invalid");
            return Err(e);
        }
    };

    output::success("Configuration is valid");
    if let Some(path) = config_path {
        output::kv("File", path.as_str());
    }

    let default = &config.retry_policies.default;
    output::kv(
        "Default retry",
        &format!(
            "{} attempt(s), {}, {}ms..{}ms",
            default.max_attempts,
            default.strategy,
            default.initial_delay_ms,
            default.max_delay_ms
        ),
    );
    output::kv(
        "Operation policies",
        &config.retry_policies.operations.len().to_string(),
    );

    let breaker = &config.circuit_breakers.default;
    output::kv(
        "Default breaker",
        &format!(
            "opens after {} failure(s), closes after {} probe(s), cools down {}ms",
            breaker.failure_threshold, breaker.success_threshold, breaker.reset_timeout_ms
        ),
    );
    output::kv(
        "Dependency breakers",
        &config.circuit_breakers.dependencies.len().to_string(),
    );
    output::kv(
        "Rollback",
        &format!(
            "breaker '{}', {} attempt(s) per cleanup",
            config.rollback.breaker, config.rollback.retry.max_attempts
        ),
    );

    Ok(())
}
