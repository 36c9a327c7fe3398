//! # Pipeline client
//!
//! ## Responsibility
//! Drive pipeline invocations against the ingest router: single-shot runs,
//! chunked parallel runs over one large input, and sequential benchmarks.
//!
//! ## Guarantees
//! - Failure is an outcome: transport errors, timeouts and error responses
//!   all become a [`RunOutcome`] with `success = false`, never an `Err`
//! - Chunk isolation: one chunk's failure (or panic) never cancels or
//!   affects its siblings
//! - Correlated: chunk `i` of a run with base id `b` is sent as `b_chunk{i}`
//!
//! ## NOT Responsible For
//! - Retrying (the routers fail over; the client reports what it got)
//! - Printing results (that belongs to the `pipeline-client` binary)

pub mod aggregate;
pub mod benchmark;
pub mod chunking;
pub mod dataset;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn, Instrument};

use crate::config::{ClientConfig, PipelineConfig};
use crate::protocol::IngestRequest;
use crate::stage::Ingest;
use crate::transport::StageTransport;
use crate::PipelineError;

pub use aggregate::{aggregate, ChunkOutcome, PipelineResult};
pub use benchmark::{BenchmarkReport, TimingStats};
pub use chunking::{split_into_chunks, ChunkMode, Chunks};
pub use dataset::{read_text_files, TextFile};

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    /// Correlation id the invocation was sent with.
    pub request_id: String,
    /// `true` only if every stage succeeded.
    pub success: bool,
    /// Client-observed latency.
    pub elapsed: Duration,
    /// Words in the cleaned text; `0` on failure.
    pub word_count: u64,
    /// Success message or failure detail.
    pub message: String,
    /// Rendered report; empty on failure.
    pub report: String,
}

/// Short random correlation id: the first eight characters of a v4 UUID.
pub fn new_request_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Correlation id of chunk `index` of a run with base id `base`.
pub fn chunk_request_id(base: &str, index: usize) -> String {
    format!("{base}_chunk{index}")
}

/// Failure detail for a chunk task that panicked or was cancelled.
fn join_failure_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("non-string panic payload");
    format!("chunk task panicked: {detail}")
}

/// Client for the ingest router.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct PipelineClient {
    addr: String,
    transport: Arc<dyn StageTransport<Ingest>>,
    timeout: Duration,
    large_timeout: Duration,
    large_input_threshold_chars: usize,
}

impl std::fmt::Debug for PipelineClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineClient")
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .field("large_timeout", &self.large_timeout)
            .field("large_input_threshold_chars", &self.large_input_threshold_chars)
            .finish()
    }
}

impl PipelineClient {
    /// Client for the ingest router at `addr`, with default timeouts.
    pub fn new(addr: impl Into<String>, transport: Arc<dyn StageTransport<Ingest>>) -> Self {
        let defaults = ClientConfig::default();
        Self {
            addr: addr.into(),
            transport,
            timeout: Duration::from_millis(defaults.timeout_ms),
            large_timeout: Duration::from_millis(defaults.large_timeout_ms),
            large_input_threshold_chars: defaults.large_input_threshold_chars,
        }
    }

    /// Client configured from the `[client]` section and the ingest router
    /// of `config`.
    pub fn from_config(
        config: &PipelineConfig,
        transport: Arc<dyn StageTransport<Ingest>>,
    ) -> Self {
        Self {
            addr: config.ingest_router().to_string(),
            transport,
            timeout: Duration::from_millis(config.client.timeout_ms),
            large_timeout: Duration::from_millis(config.client.large_timeout_ms),
            large_input_threshold_chars: config.client.large_input_threshold_chars,
        }
    }

    /// Override the single-shot and large-input timeouts.
    pub fn with_timeouts(mut self, timeout: Duration, large_timeout: Duration) -> Self {
        self.timeout = timeout;
        self.large_timeout = large_timeout;
        self
    }

    /// Override the character count above which inputs are split by
    /// character.
    pub fn with_large_input_threshold(mut self, chars: usize) -> Self {
        self.large_input_threshold_chars = chars;
        self
    }

    /// Ingest router address.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one invocation with the given id and timeout.
    async fn invoke(&self, request_id: String, text: String, timeout: Duration) -> RunOutcome {
        let started = Instant::now();
        let request = IngestRequest {
            request_id: request_id.clone(),
            text,
        };
        let result = self.transport.call(&self.addr, &request, timeout).await;
        let elapsed = started.elapsed();

        match result {
            Ok(resp) if resp.status.is_success() => RunOutcome {
                request_id,
                success: true,
                elapsed,
                word_count: resp.word_count,
                message: resp.message,
                report: resp.report,
            },
            Ok(resp) => RunOutcome {
                request_id,
                success: false,
                elapsed,
                word_count: 0,
                message: resp.message,
                report: String::new(),
            },
            Err(e) => RunOutcome {
                request_id,
                success: false,
                elapsed,
                word_count: 0,
                message: e.to_string(),
                report: String::new(),
            },
        }
    }

    /// Run `text` through the pipeline once.
    ///
    /// Inputs longer than the large-input threshold get the long timeout.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn run_once(&self, text: &str) -> RunOutcome {
        let request_id = new_request_id();
        let large = text.chars().count() > self.large_input_threshold_chars;
        let timeout = if large { self.large_timeout } else { self.timeout };

        let span = tracing::info_span!("client.run_once", request_id = %request_id);
        let outcome = self
            .invoke(request_id, text.to_string(), timeout)
            .instrument(span)
            .await;

        if outcome.success {
            info!(
                request_id = %outcome.request_id,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                word_count = outcome.word_count,
                "pipeline run succeeded"
            );
        } else {
            warn!(
                request_id = %outcome.request_id,
                elapsed_ms = outcome.elapsed.as_millis() as u64,
                error = %outcome.message,
                "pipeline run failed"
            );
        }
        outcome
    }

    /// Split `text` into `n` chunks and run them concurrently, one task per
    /// chunk, then aggregate once every chunk resolved.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidRequest`] if `n` is zero. Chunk
    /// failures are reported inside the result, never as `Err`.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn run_chunked(
        &self,
        text: &str,
        n: usize,
    ) -> Result<PipelineResult, PipelineError> {
        let chunks = split_into_chunks(text, n, self.large_input_threshold_chars)?;
        let base = new_request_id();
        info!(
            base_id = %base,
            chunks = n,
            mode = ?chunks.mode,
            text_len = text.chars().count(),
            "starting chunked run"
        );

        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let mut task_index: HashMap<tokio::task::Id, usize> = HashMap::with_capacity(n);
        for (index, piece) in chunks.pieces.into_iter().enumerate() {
            let client = self.clone();
            let request_id = chunk_request_id(&base, index);
            let span = tracing::info_span!("client.chunk", request_id = %request_id, index);
            let handle = tasks.spawn(
                async move {
                    let outcome = client.invoke(request_id, piece, client.large_timeout).await;
                    ChunkOutcome { index, outcome }
                }
                .instrument(span),
            );
            task_index.insert(handle.id(), index);
        }

        let mut done: BTreeMap<usize, ChunkOutcome> = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(chunk) => {
                    if !chunk.outcome.success {
                        warn!(index = chunk.index, error = %chunk.outcome.message, "chunk failed");
                    }
                    done.insert(chunk.index, chunk);
                }
                Err(e) => {
                    let Some(&index) = task_index.get(&e.id()) else {
                        warn!(error = %e, "unknown chunk task did not complete");
                        continue;
                    };
                    let message = join_failure_message(e);
                    warn!(index, error = %message, "chunk task did not complete");
                    done.insert(
                        index,
                        ChunkOutcome {
                            index,
                            outcome: RunOutcome {
                                request_id: chunk_request_id(&base, index),
                                success: false,
                                elapsed: started.elapsed(),
                                word_count: 0,
                                message,
                                report: String::new(),
                            },
                        },
                    );
                }
            }
        }
        let total_elapsed = started.elapsed();

        let result = aggregate(done.into_values().collect(), total_elapsed);
        info!(
            base_id = %base,
            succeeded = result.success_count,
            failed = result.failure_count,
            total_words = result.total_words,
            elapsed_ms = total_elapsed.as_millis() as u64,
            "chunked run finished"
        );
        Ok(result)
    }

    /// One warm-up run, then `iterations` sequential runs separated by
    /// `pause`.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn benchmark(
        &self,
        text: &str,
        iterations: usize,
        pause: Duration,
    ) -> BenchmarkReport {
        let _ = self.run_once(text).await;

        let mut times = Vec::with_capacity(iterations);
        let mut successes = 0;
        for i in 0..iterations {
            let outcome = self.run_once(text).await;
            times.push(outcome.elapsed);
            if outcome.success {
                successes += 1;
            }
            if i + 1 < iterations && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        BenchmarkReport {
            iterations,
            successes,
            stats: TimingStats::from_durations(&times),
            times,
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
