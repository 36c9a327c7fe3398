//! # text-pipeline
//!
//! Request routing and stage chaining for a four-stage text-processing
//! pipeline over Tokio.
//!
//! ## Architecture
//!
//! Every stage is fronted by a round-robin router that fails over across a
//! fixed set of homogeneous replicas. Each processor synchronously calls the
//! next stage's router, and the rendered report flows back up the chain:
//! ```text
//! Client → Router(ingest) → Ingest → Router(clean) → Clean
//!        → Router(analyze) → Analyze → Router(report) → Report
//! ```
//!
//! Routers and processors of a stage expose the same contract, so a caller
//! never knows whether it is talking to a replica or to the router in front
//! of it.

// ── Lint policy ───────────────────────────────────────────────────────────
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(missing_docs)]

use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub mod client;
pub mod config;
pub mod metrics;
pub mod processor;
pub mod protocol;
pub mod router;
pub mod server;
pub mod stage;
pub mod text;
pub mod transport;

// Re-exports for convenience
pub use client::{PipelineClient, PipelineResult, RunOutcome};
pub use config::PipelineConfig;
pub use processor::{
    AnalyzeProcessor, CleanProcessor, Downstream, IngestProcessor, ReportProcessor, StageService,
};
pub use protocol::Status;
pub use router::{Router, RouterStats};
pub use stage::{Analyze, Clean, Ingest, Report, Stage, StageContract};
pub use transport::{HttpTransport, StageTransport};

/// Initialise the global tracing subscriber.
///
/// Reads the `LOG_FORMAT` environment variable to choose output format:
/// - `"json"`: structured JSON output for log aggregators
/// - anything else (including unset): human-readable pretty output
///
/// Filter level is controlled by `RUST_LOG` (e.g. `RUST_LOG=info`).
///
/// # Errors
///
/// Returns [`PipelineError::Other`] if the global subscriber has already
/// been set (e.g. by a previous call or a test harness).
///
/// # Panics
///
/// This function never panics.
pub fn init_tracing() -> Result<(), PipelineError> {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .with_span_list(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| PipelineError::Other(format!("tracing init failed: {e}")))
}

/// Top-level pipeline errors.
///
/// Transport, timeout, and backend failures describe a single call to a
/// single address. Routers fold any number of those into one
/// [`PipelineError::Exhausted`]; nothing here is fatal to the process.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The backend could not be reached or the connection broke mid-call.
    #[error("transport error calling {addr}: {detail}")]
    Transport {
        /// Address that was called.
        addr: String,
        /// Underlying failure description.
        detail: String,
    },

    /// The backend did not answer within the per-call timeout.
    #[error("call to {addr} timed out after {timeout_ms}ms")]
    Timeout {
        /// Address that was called.
        addr: String,
        /// Timeout that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The backend answered, but with an error status.
    #[error("{addr} reported error: {message}")]
    Backend {
        /// Address that was called.
        addr: String,
        /// Detail string from the backend's response.
        message: String,
    },

    /// Every replica behind a router was tried once and all failed.
    #[error("All {stage} replicas failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Display name of the stage whose router gave up.
        stage: String,
        /// Number of replicas attempted (always the replica count).
        attempts: usize,
        /// Description of the final attempt's failure.
        last_error: String,
    },

    /// The request violates the contract (e.g. empty `request_id`).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Catch-all for errors that do not fit a specific variant.
    #[error("{0}")]
    Other(String),
}

impl PipelineError {
    /// Short machine-friendly label used for span fields and metric labels.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Backend { .. } => "backend",
            Self::Exhausted { .. } => "exhausted",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ConfigError(_) => "config",
            Self::Other(_) => "other",
        }
    }
}

/// Reject empty correlation ids before any work or outbound call happens.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidRequest`] if `request_id` is empty or
/// whitespace only.
pub fn validate_request_id(request_id: &str) -> Result<(), PipelineError> {
    if request_id.trim().is_empty() {
        return Err(PipelineError::InvalidRequest(
            "request_id must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_display_includes_attempt_count() {
        let err = PipelineError::Exhausted {
            stage: "Clean".to_string(),
            attempts: 3,
            last_error: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("All Clean replicas failed after 3 attempts"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_timeout_display_includes_address_and_duration() {
        let err = PipelineError::Timeout {
            addr: "10.0.0.1:8051".to_string(),
            timeout_ms: 250,
        };
        assert_eq!(err.to_string(), "call to 10.0.0.1:8051 timed out after 250ms");
    }

    #[test]
    fn test_error_kind_labels_are_distinct() {
        let kinds = [
            PipelineError::Transport {
                addr: String::new(),
                detail: String::new(),
            }
            .kind(),
            PipelineError::Timeout {
                addr: String::new(),
                timeout_ms: 0,
            }
            .kind(),
            PipelineError::Backend {
                addr: String::new(),
                message: String::new(),
            }
            .kind(),
            PipelineError::InvalidRequest(String::new()).kind(),
            PipelineError::ConfigError(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn test_validate_request_id_rejects_blank() {
        assert!(validate_request_id("").is_err());
        assert!(validate_request_id("   ").is_err());
        assert!(validate_request_id("abc123_chunk0").is_ok());
    }

    #[test]
    fn test_init_tracing_second_call_returns_err() {
        let _ = init_tracing();
        let result = init_tracing();
        assert!(result.is_err(), "double init must return Err, not panic");
    }
}
