//! Configuration validation engine.
//!
//! ## Responsibility
//! Check the semantic constraints on a parsed [`PipelineConfig`] that serde
//! cannot express: non-empty addresses, non-zero timeouts and pool sizes.
//!
//! ## Guarantees
//! - Every rule has at least one test that triggers it
//! - Validation collects *all* errors before returning (no short-circuit)
//! - Error messages include the field path and the invalid value
//!
//! ## NOT Responsible For
//! - Parsing TOML (that belongs to `loader`)
//! - Checking that addresses are reachable

use super::PipelineConfig;
use crate::stage::Stage;

/// Errors arising from configuration parsing, validation, or I/O.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("Parse error in {file}: {source}")]
    Parse {
        /// Path of the file that failed to parse.
        file: String,
        /// Underlying TOML deserialization error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more semantic validation rules failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A specific field has an out-of-range value.
    #[error("Field '{field}' has invalid value {value}: {reason}")]
    InvalidField {
        /// Dot-separated field path (e.g., "stages.clean.replicas").
        field: String,
        /// String representation of the invalid value.
        value: String,
        /// Human-readable explanation of the constraint.
        reason: String,
    },

    /// File I/O error.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// Path of the file that could not be read.
        file: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn invalid(field: String, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidField {
        field,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Validate all semantic constraints on a [`PipelineConfig`].
///
/// # Returns
///
/// - `Ok(())` if all constraints pass.
/// - `Err(Vec<ConfigError>)` with every violation found.
///
/// # Panics
///
/// This function never panics.
pub fn validate(config: &PipelineConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // ── Transport ────────────────────────────────────────────────────
    if config.transport.max_message_bytes == 0 {
        errors.push(invalid(
            "transport.max_message_bytes".into(),
            0,
            "must be at least 1",
        ));
    }

    // ── Stages ───────────────────────────────────────────────────────
    for stage in Stage::ALL {
        let s = config.stage(stage);
        let path = format!("stages.{stage}");

        if s.router.trim().is_empty() {
            errors.push(invalid(format!("{path}.router"), "\"\"", "must not be empty"));
        }
        if s.replicas.is_empty() {
            errors.push(invalid(
                format!("{path}.replicas"),
                "[]",
                "at least one replica is required",
            ));
        }
        for (i, addr) in s.replicas.iter().enumerate() {
            if addr.trim().is_empty() {
                errors.push(invalid(
                    format!("{path}.replicas[{i}]"),
                    "\"\"",
                    "must not be empty",
                ));
            }
        }
        if s.replica_timeout_ms == 0 {
            errors.push(invalid(
                format!("{path}.replica_timeout_ms"),
                0,
                "must be greater than 0",
            ));
        }
        if s.downstream_timeout_ms == 0 {
            errors.push(invalid(
                format!("{path}.downstream_timeout_ms"),
                0,
                "must be greater than 0",
            ));
        }
        if s.router_workers == 0 {
            errors.push(invalid(
                format!("{path}.router_workers"),
                0,
                "must be at least 1",
            ));
        }
        if s.processor_workers == 0 {
            errors.push(invalid(
                format!("{path}.processor_workers"),
                0,
                "must be at least 1",
            ));
        }
    }

    // ── Client ───────────────────────────────────────────────────────
    if let Some(addr) = &config.client.ingest_router {
        if addr.trim().is_empty() {
            errors.push(invalid(
                "client.ingest_router".into(),
                "\"\"",
                "must not be empty when set",
            ));
        }
    }
    if config.client.timeout_ms == 0 {
        errors.push(invalid("client.timeout_ms".into(), 0, "must be greater than 0"));
    }
    if config.client.large_timeout_ms == 0 {
        errors.push(invalid(
            "client.large_timeout_ms".into(),
            0,
            "must be greater than 0",
        ));
    }
    if config.client.large_input_threshold_chars == 0 {
        errors.push(invalid(
            "client.large_input_threshold_chars".into(),
            0,
            "must be at least 1",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field_names(errors: &[ConfigError]) -> Vec<String> {
        errors
            .iter()
            .filter_map(|e| match e {
                ConfigError::InvalidField { field, .. } => Some(field.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&PipelineConfig::default()).is_ok());
    }

    #[test]
    fn test_empty_replica_list_is_rejected() {
        let mut config = PipelineConfig::default();
        config.stages.analyze.replicas.clear();
        let errors = validate(&config).unwrap_err();
        assert_eq!(field_names(&errors), vec!["stages.analyze.replicas"]);
    }

    #[test]
    fn test_blank_addresses_are_rejected() {
        let mut config = PipelineConfig::default();
        config.stages.clean.router = "  ".to_string();
        config.stages.clean.replicas[1] = String::new();
        config.client.ingest_router = Some(String::new());
        let names = field_names(&validate(&config).unwrap_err());
        assert!(names.contains(&"stages.clean.router".to_string()));
        assert!(names.contains(&"stages.clean.replicas[1]".to_string()));
        assert!(names.contains(&"client.ingest_router".to_string()));
    }

    #[test]
    fn test_zero_timeouts_and_workers_are_rejected() {
        let mut config = PipelineConfig::default();
        config.stages.report.replica_timeout_ms = 0;
        config.stages.report.downstream_timeout_ms = 0;
        config.stages.ingest.router_workers = 0;
        config.stages.ingest.processor_workers = 0;
        let names = field_names(&validate(&config).unwrap_err());
        assert!(names.contains(&"stages.report.replica_timeout_ms".to_string()));
        assert!(names.contains(&"stages.report.downstream_timeout_ms".to_string()));
        assert!(names.contains(&"stages.ingest.router_workers".to_string()));
        assert!(names.contains(&"stages.ingest.processor_workers".to_string()));
    }

    #[test]
    fn test_transport_and_client_limits_are_checked() {
        let mut config = PipelineConfig::default();
        config.transport.max_message_bytes = 0;
        config.client.timeout_ms = 0;
        config.client.large_timeout_ms = 0;
        config.client.large_input_threshold_chars = 0;
        let names = field_names(&validate(&config).unwrap_err());
        assert_eq!(
            names,
            vec![
                "transport.max_message_bytes",
                "client.timeout_ms",
                "client.large_timeout_ms",
                "client.large_input_threshold_chars",
            ]
        );
    }

    #[test]
    fn test_all_errors_are_collected() {
        let mut config = PipelineConfig::default();
        for stage in Stage::ALL {
            config.stages.get_mut(stage).replicas.clear();
        }
        assert_eq!(validate(&config).unwrap_err().len(), 4);
    }

    #[test]
    fn test_invalid_field_display_includes_path_and_value() {
        let err = invalid("stages.clean.router_workers".into(), 0, "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Field 'stages.clean.router_workers' has invalid value 0: must be at least 1"
        );
    }
}
