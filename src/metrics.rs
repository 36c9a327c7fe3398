//! Prometheus metrics for routers and stage processors.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup before serving. The helper
//! functions (`inc_router_attempt`, `record_stage_latency`, …) are no-ops if
//! `init_metrics` was never called, so library users and tests that skip it
//! simply get no metrics.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `pipeline_router_attempts_total` | Counter | `stage`, `replica` |
//! | `pipeline_router_errors_total` | Counter | `stage`, `replica`, `err_type` |
//! | `pipeline_router_exhausted_total` | Counter | `stage` |
//! | `pipeline_stage_requests_total` | Counter | `stage` |
//! | `pipeline_stage_errors_total` | Counter | `stage`, `err_type` |
//! | `pipeline_stage_duration_seconds` | Histogram | `stage` |

use crate::PipelineError;
use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;
use std::time::Duration;

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All pipeline metrics, stored together in a single [`OnceLock`].
pub struct Metrics {
    /// Registry that owns every descriptor below.
    pub registry: Registry,
    /// Attempts a router made, per replica.
    pub router_attempts: CounterVec,
    /// Failed attempts, per replica and failure kind.
    pub router_errors: CounterVec,
    /// Requests for which every replica failed.
    pub router_exhausted: CounterVec,
    /// Requests handled by a processor.
    pub stage_requests: CounterVec,
    /// Processor requests answered with an error, by kind.
    pub stage_errors: CounterVec,
    /// Processor latency, including the synchronous downstream call.
    pub stage_duration: HistogramVec,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

fn counter(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> Result<CounterVec, PipelineError> {
    let vec = CounterVec::new(Opts::new(name, help), labels)
        .map_err(|e| PipelineError::Other(format!("metrics init failed: {e}")))?;
    registry
        .register(Box::new(vec.clone()))
        .map_err(|e| PipelineError::Other(format!("metrics registration failed: {e}")))?;
    Ok(vec)
}

impl Metrics {
    /// Build every metric and register it with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Other`] on descriptor or registration failure.
    pub fn new(registry: Registry) -> Result<Self, PipelineError> {
        let router_attempts = counter(
            &registry,
            "pipeline_router_attempts_total",
            "Attempts routed to each replica",
            &["stage", "replica"],
        )?;
        let router_errors = counter(
            &registry,
            "pipeline_router_errors_total",
            "Failed attempts by replica and failure kind",
            &["stage", "replica", "err_type"],
        )?;
        let router_exhausted = counter(
            &registry,
            "pipeline_router_exhausted_total",
            "Requests for which every replica failed",
            &["stage"],
        )?;
        let stage_requests = counter(
            &registry,
            "pipeline_stage_requests_total",
            "Requests handled per stage",
            &["stage"],
        )?;
        let stage_errors = counter(
            &registry,
            "pipeline_stage_errors_total",
            "Error responses per stage and kind",
            &["stage", "err_type"],
        )?;

        let stage_duration = HistogramVec::new(
            HistogramOpts::new(
                "pipeline_stage_duration_seconds",
                "Processing duration per stage, downstream call included",
            ),
            &["stage"],
        )
        .map_err(|e| PipelineError::Other(format!("metrics init failed: {e}")))?;
        registry
            .register(Box::new(stage_duration.clone()))
            .map_err(|e| PipelineError::Other(format!("metrics registration failed: {e}")))?;

        Ok(Self {
            registry,
            router_attempts,
            router_errors,
            router_exhausted,
            stage_requests,
            stage_errors,
            stage_duration,
        })
    }
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise the global metrics bundle with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`PipelineError::Other`] if metric construction or registration
/// fails.
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), PipelineError> {
    if METRICS.get().is_some() {
        return Ok(());
    }
    let bundle = Metrics::new(Registry::new())?;
    // A racing initialiser produces identical descriptors; first one wins.
    let _ = METRICS.set(bundle);
    Ok(())
}

fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Count one routing attempt against `replica`.
///
/// # Panics
///
/// This function never panics.
pub fn inc_router_attempt(stage: &str, replica: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.router_attempts.get_metric_with_label_values(&[stage, replica]) {
            c.inc();
        }
    }
}

/// Count one failed routing attempt.
///
/// # Panics
///
/// This function never panics.
pub fn inc_router_error(stage: &str, replica: &str, err_type: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .router_errors
            .get_metric_with_label_values(&[stage, replica, err_type])
        {
            c.inc();
        }
    }
}

/// Count one request that exhausted every replica.
///
/// # Panics
///
/// This function never panics.
pub fn inc_router_exhausted(stage: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.router_exhausted.get_metric_with_label_values(&[stage]) {
            c.inc();
        }
    }
}

/// Count one request entering a processor.
///
/// # Panics
///
/// This function never panics.
pub fn inc_stage_request(stage: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.stage_requests.get_metric_with_label_values(&[stage]) {
            c.inc();
        }
    }
}

/// Count one processor error response.
///
/// # Panics
///
/// This function never panics.
pub fn inc_stage_error(stage: &str, err_type: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .stage_errors
            .get_metric_with_label_values(&[stage, err_type])
        {
            c.inc();
        }
    }
}

/// Record a processor's latency.
///
/// # Panics
///
/// This function never panics.
pub fn record_stage_latency(stage: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.stage_duration.get_metric_with_label_values(&[stage]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Gather all registered metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or encoding
/// fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let mut buffer = Vec::new();
    if TextEncoder::new().encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
