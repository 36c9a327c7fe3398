//! Folding per-chunk outcomes into one [`PipelineResult`].

use std::time::Duration;

use serde::Serialize;

use super::RunOutcome;

/// Outcome of one chunk of a chunked run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkOutcome {
    /// Position of the chunk in the input.
    pub index: usize,
    /// What the pipeline returned for it.
    pub outcome: RunOutcome,
}

/// Aggregate of a chunked run, built only after every chunk resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Per-chunk outcomes ordered by chunk index.
    pub outcomes: Vec<ChunkOutcome>,
    /// Wall-clock time from the first dispatch to the last completion.
    pub total_elapsed: Duration,
    /// Chunks that succeeded end to end.
    pub success_count: usize,
    /// Chunks that failed for any reason.
    pub failure_count: usize,
    /// Sum of `word_count` over successful chunks only.
    pub total_words: u64,
    /// Mean per-chunk latency over all chunks.
    pub average_time: Duration,
    /// `average_time × chunks / total_elapsed`; `0.0` unless more than one
    /// chunk succeeded.
    pub speedup: f64,
}

impl PipelineResult {
    /// Failed chunks, in index order.
    pub fn failures(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.outcomes.iter().filter(|c| !c.outcome.success)
    }
}

/// Order-independent reduction over completed chunk outcomes.
///
/// # Panics
///
/// This function never panics.
pub fn aggregate(mut outcomes: Vec<ChunkOutcome>, total_elapsed: Duration) -> PipelineResult {
    outcomes.sort_by_key(|c| c.index);

    let success_count = outcomes.iter().filter(|c| c.outcome.success).count();
    let failure_count = outcomes.len() - success_count;
    let total_words = outcomes
        .iter()
        .filter(|c| c.outcome.success)
        .map(|c| c.outcome.word_count)
        .sum();

    let average_time = if outcomes.is_empty() {
        Duration::ZERO
    } else {
        let sum: Duration = outcomes.iter().map(|c| c.outcome.elapsed).sum();
        sum / outcomes.len() as u32
    };

    let total_secs = total_elapsed.as_secs_f64();
    let speedup = if success_count > 1 && total_secs > 0.0 {
        average_time.as_secs_f64() * outcomes.len() as f64 / total_secs
    } else {
        0.0
    };

    PipelineResult {
        outcomes,
        total_elapsed,
        success_count,
        failure_count,
        total_words,
        average_time,
        speedup,
    }
}
