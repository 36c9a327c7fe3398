//! Configuration loading.
//!
//! ## Responsibility
//! Read a TOML file (or fall back to the built-in local topology), apply
//! environment overrides, and run validation before returning.
//!
//! ## Guarantees
//! - A successfully loaded config is always validated, after overrides
//! - I/O errors and parse errors are distinguished in the error type
//! - File path is included in every error message
//!
//! ## Environment Overrides
//!
//! | Variable | Effect |
//! |----------|--------|
//! | `PIPELINE_<STAGE>_ROUTER` | replaces `stages.<stage>.router` |
//! | `PIPELINE_<STAGE>_REPLICAS` | comma-separated list replacing `stages.<stage>.replicas` |
//! | `PIPELINE_CLIENT_INGEST_ROUTER` | sets `client.ingest_router` |
//!
//! `<STAGE>` is one of `INGEST`, `CLEAN`, `ANALYZE`, `REPORT`.
//!
//! ## NOT Responsible For
//! - Defining the config schema (that belongs to `mod.rs`)

use std::path::Path;

use super::validation::{self, ConfigError};
use super::PipelineConfig;
use crate::stage::Stage;

/// Load a [`PipelineConfig`] from a TOML file, without environment
/// overrides.
///
/// # Returns
///
/// - `Ok(PipelineConfig)` if the file is readable, well-formed, and valid.
/// - `Err(ConfigError::Io)` if the file cannot be read.
/// - `Err(ConfigError::Parse)` if the TOML is malformed.
/// - `Err(ConfigError::Validation)` if semantic constraints are violated.
///
/// # Panics
///
/// This function never panics.
pub fn load_from_file(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let content = read(path)?;
    load_from_str(&content, &path.display().to_string())
}

/// Load a [`PipelineConfig`] from a TOML string, without environment
/// overrides.
///
/// # Arguments
///
/// * `content`: TOML content as a string.
/// * `source_name`: Identifier for the source (used in error messages).
///
/// # Errors
///
/// [`ConfigError::Parse`] or [`ConfigError::Validation`].
///
/// # Panics
///
/// This function never panics.
pub fn load_from_str(content: &str, source_name: &str) -> Result<PipelineConfig, ConfigError> {
    let config = parse(content, source_name)?;
    check(config)
}

/// Process configuration: the file at `path` if given, else the built-in
/// local topology, with `PIPELINE_*` environment overrides applied.
///
/// # Errors
///
/// Any [`ConfigError`].
///
/// # Panics
///
/// This function never panics.
pub fn load(path: Option<&Path>) -> Result<PipelineConfig, ConfigError> {
    let mut config = match path {
        Some(path) => parse(&read(path)?, &path.display().to_string())?,
        None => PipelineConfig::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    check(config)
}

/// Apply `PIPELINE_*` overrides read through `lookup`.
///
/// Empty values are ignored. Replica lists are split on commas and trimmed.
///
/// # Panics
///
/// This function never panics.
pub fn apply_env_overrides<F>(config: &mut PipelineConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    for stage in Stage::ALL {
        let prefix = format!("PIPELINE_{}", stage.as_str().to_ascii_uppercase());
        let target = config.stages.get_mut(stage);

        if let Some(router) = present(&format!("{prefix}_ROUTER")) {
            tracing::debug!(stage = %stage, router = %router, "router address overridden from env");
            target.router = router.trim().to_string();
        }
        if let Some(list) = present(&format!("{prefix}_REPLICAS")) {
            target.replicas = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            tracing::debug!(stage = %stage, replicas = target.replicas.len(), "replica set overridden from env");
        }
    }

    if let Some(addr) = present("PIPELINE_CLIENT_INGEST_ROUTER") {
        config.client.ingest_router = Some(addr.trim().to_string());
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        file: path.display().to_string(),
        source: e,
    })
}

fn parse(content: &str, source_name: &str) -> Result<PipelineConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::Parse {
        file: source_name.to_string(),
        source: e,
    })
}

fn check(config: PipelineConfig) -> Result<PipelineConfig, ConfigError> {
    validation::validate(&config).map_err(|errors| {
        ConfigError::Validation(
            errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    })?;
    Ok(config)
}
