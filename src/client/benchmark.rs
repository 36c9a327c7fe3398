//! # Benchmark statistics
//!
//! ## Responsibility
//! Summarise the latencies of repeated single-shot runs: mean, median,
//! extremes, sample standard deviation and throughput.
//!
//! ## Guarantees
//! - Order-independent: samples are sorted before any statistic is taken
//! - An empty sample set yields no statistics rather than NaNs
//! - `stdev` is `None` for a single sample
//!
//! ## NOT Responsible For
//! - Running the measured calls (that belongs to `PipelineClient::benchmark`)

use std::time::Duration;

use serde::Serialize;

/// Summary statistics over a set of latencies, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimingStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Middle value (mean of the two middle values for even counts).
    pub median: f64,
    /// Fastest run.
    pub min: f64,
    /// Slowest run.
    pub max: f64,
    /// Sample standard deviation; `None` for a single sample.
    pub stdev: Option<f64>,
    /// Runs per second of summed latency.
    pub throughput: f64,
}

impl TimingStats {
    /// Compute statistics, or `None` for an empty set.
    pub fn from_durations(times: &[Duration]) -> Option<Self> {
        if times.is_empty() {
            return None;
        }
        let mut secs: Vec<f64> = times.iter().map(Duration::as_secs_f64).collect();
        secs.sort_by(f64::total_cmp);

        let n = secs.len();
        let total: f64 = secs.iter().sum();
        let mean = total / n as f64;
        let median = if n % 2 == 1 {
            secs[n / 2]
        } else {
            (secs[n / 2 - 1] + secs[n / 2]) / 2.0
        };
        let stdev = (n > 1).then(|| {
            let var = secs.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        });

        Some(Self {
            mean,
            median,
            min: secs[0],
            max: secs[n - 1],
            stdev,
            throughput: if total > 0.0 { n as f64 / total } else { 0.0 },
        })
    }
}

/// Result of [`super::PipelineClient::benchmark`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchmarkReport {
    /// Measured runs (the warm-up run is excluded).
    pub iterations: usize,
    /// Runs that succeeded end to end.
    pub successes: usize,
    /// Latency of every measured run, in order.
    pub times: Vec<Duration>,
    /// Statistics over `times`; `None` when no run was measured.
    pub stats: Option<TimingStats>,
}
