//! # Stage processors
//!
//! ## Responsibility
//! Apply one stage's pure transformation and, for every stage but the last,
//! synchronously call the next stage's router with the same `request_id` and
//! the transformed payload. The processor's own response is built only after
//! that downstream call resolves.
//!
//! ## Guarantees
//! - Correlated: the outbound request always carries the inbound
//!   `request_id` unchanged.
//! - No retries: a downstream failure is reported once, immediately, as an
//!   error response with a zero/empty payload. Failover is the router's job.
//! - No partial results: an error response never carries this stage's own
//!   transformation output.
//! - Never panics on bad input; every failure is a response.
//!
//! ## NOT Responsible For
//! - Choosing replicas (that belongs to `router`)
//! - HTTP framing and status codes (that belongs to `server`)
//!
//! ## Span Fields (every stage)
//!
//! | Field | Description |
//! |-------|-------------|
//! | `request_id` | Correlation token |
//! | `stage` | Stage name |
//! | `duration_ms` | Recorded after the downstream call resolves |
//! | `outcome` | `"ok"` or `"err"` |
//! | `error_kind` | Recorded only on error |
//!
//! Text payloads are never logged, only their lengths.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn, Instrument, Span};

use crate::metrics;
use crate::protocol::{
    AnalyzeRequest, AnalyzeResponse, CleanRequest, CleanResponse, IngestRequest, IngestResponse,
    ReportRequest, ReportResponse, Status, WireResponse,
};
use crate::stage::{Analyze, Clean, Ingest, Report, Stage, StageContract};
use crate::text;
use crate::transport::StageTransport;
use crate::{validate_request_id, PipelineError};

/// Anything that answers a stage's RPC contract: a processor or the router
/// in front of a set of processors.
///
/// Object-safe so servers can hold an `Arc<dyn StageService<C>>`.
#[async_trait]
pub trait StageService<C: StageContract>: Send + Sync {
    /// Answer one request. Failures are returned as error responses.
    async fn handle(&self, request: C::Request) -> C::Response;
}

/// The next hop of a processor: one router address reached through a
/// transport with a fixed per-call timeout.
pub struct Downstream<C: StageContract> {
    addr: String,
    timeout: Duration,
    transport: Arc<dyn StageTransport<C>>,
}

impl<C: StageContract> std::fmt::Debug for Downstream<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downstream")
            .field("stage", &C::STAGE)
            .field("addr", &self.addr)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<C: StageContract> Downstream<C> {
    /// Point at the router serving `C` at `addr`.
    pub fn new(
        addr: impl Into<String>,
        timeout: Duration,
        transport: Arc<dyn StageTransport<C>>,
    ) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            transport,
        }
    }

    /// Address of the next-stage router.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Make exactly one call.
    ///
    /// # Errors
    ///
    /// Any transport, timeout or backend failure, including a decoded
    /// response whose status is `error`.
    pub async fn call(&self, request: &C::Request) -> Result<C::Response, PipelineError> {
        let response = self
            .transport
            .call(&self.addr, request, self.timeout)
            .await?;
        match response.failure() {
            Some(message) => Err(PipelineError::Backend {
                addr: self.addr.clone(),
                message: message.to_string(),
            }),
            None => Ok(response),
        }
    }
}

/// Error message a processor reports when its work fails.
fn failure_message(stage: Stage, err: &PipelineError) -> String {
    match (stage, err) {
        (_, PipelineError::InvalidRequest(_)) => err.to_string(),
        (Stage::Ingest, _) => format!("Pipeline failed: {err}"),
        (_, _) => match stage.next() {
            Some(next) => format!("Failed to call {} service: {err}", next.display_name()),
            None => format!("{} failed: {err}", stage.display_name()),
        },
    }
}

/// Run one processor invocation inside its span, with metrics, and fold any
/// error into the stage's error response.
async fn run_stage<C, F, Fut>(request_id: &str, text_len: u64, work: F) -> C::Response
where
    C: StageContract,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<C::Response, PipelineError>>,
{
    let stage = C::STAGE;
    let span = tracing::info_span!(
        "stage.process",
        stage = %stage,
        request_id = %request_id,
        text_len = text_len,
        duration_ms = tracing::field::Empty,
        outcome = tracing::field::Empty,
        error_kind = tracing::field::Empty,
    );

    async move {
        let start = Instant::now();
        metrics::inc_stage_request(stage.as_str());
        info!(text_len = text_len, "request received");

        let result = match validate_request_id(request_id) {
            Ok(()) => work().await,
            Err(e) => Err(e),
        };

        let elapsed = start.elapsed();
        metrics::record_stage_latency(stage.as_str(), elapsed);
        Span::current().record("duration_ms", elapsed.as_millis() as u64);

        match result {
            Ok(response) => {
                Span::current().record("outcome", "ok");
                info!(duration_ms = elapsed.as_millis() as u64, "request completed");
                response
            }
            Err(e) => {
                Span::current().record("outcome", "err");
                Span::current().record("error_kind", e.kind());
                metrics::inc_stage_error(stage.as_str(), e.kind());
                warn!(error = %e, "request failed");
                C::Response::failed(failure_message(stage, &e))
            }
        }
    }
    .instrument(span)
    .await
}

// ============================================================================
// Ingest
// ============================================================================

/// Entry stage: passes the text on unchanged and reports the cleaned word
/// count plus the final report.
#[derive(Debug)]
pub struct IngestProcessor {
    downstream: Downstream<Clean>,
}

impl IngestProcessor {
    /// Chain to the clean router behind `downstream`.
    pub fn new(downstream: Downstream<Clean>) -> Self {
        Self { downstream }
    }
}

#[async_trait]
impl StageService<Ingest> for IngestProcessor {
    async fn handle(&self, request: IngestRequest) -> IngestResponse {
        let text_len = text::char_len(&request.text);
        let request_id = request.request_id.clone();
        let started = Instant::now();

        run_stage::<Ingest, _, _>(&request_id, text_len, || async {
            let clean_request = CleanRequest {
                request_id: request.request_id,
                text: request.text,
            };
            let cleaned = self.downstream.call(&clean_request).await?;
            let word_count = text::word_count(&cleaned.cleaned_text);
            let elapsed = started.elapsed().as_secs_f64();

            Ok(IngestResponse {
                status: Status::Success,
                message: format!(
                    "Text processed successfully through pipeline in {elapsed:.3}s"
                ),
                word_count,
                report: cleaned.report,
            })
        })
        .await
    }
}

// ============================================================================
// Clean
// ============================================================================

/// Normalises text and forwards it to the analyze router.
#[derive(Debug)]
pub struct CleanProcessor {
    downstream: Downstream<Analyze>,
}

impl CleanProcessor {
    /// Chain to the analyze router behind `downstream`.
    pub fn new(downstream: Downstream<Analyze>) -> Self {
        Self { downstream }
    }
}

#[async_trait]
impl StageService<Clean> for CleanProcessor {
    async fn handle(&self, request: CleanRequest) -> CleanResponse {
        let text_len = text::char_len(&request.text);
        let request_id = request.request_id.clone();

        run_stage::<Clean, _, _>(&request_id, text_len, || async {
            let cleaned = text::clean(&request.text);
            let analyze_request = AnalyzeRequest {
                request_id: request.request_id,
                text: cleaned.text.clone(),
                original_length: cleaned.original_length,
            };
            let analysis = self.downstream.call(&analyze_request).await?;

            Ok(CleanResponse {
                status: Status::Success,
                message: format!(
                    "Cleaned {} chars to {} chars",
                    cleaned.original_length, cleaned.cleaned_length
                ),
                cleaned_text: cleaned.text,
                original_length: cleaned.original_length,
                cleaned_length: cleaned.cleaned_length,
                report: analysis.report,
            })
        })
        .await
    }
}

// ============================================================================
// Analyze
// ============================================================================

/// Computes word statistics and forwards them to the report router.
#[derive(Debug)]
pub struct AnalyzeProcessor {
    downstream: Downstream<Report>,
}

impl AnalyzeProcessor {
    /// Chain to the report router behind `downstream`.
    pub fn new(downstream: Downstream<Report>) -> Self {
        Self { downstream }
    }
}

#[async_trait]
impl StageService<Analyze> for AnalyzeProcessor {
    async fn handle(&self, request: AnalyzeRequest) -> AnalyzeResponse {
        let text_len = text::char_len(&request.text);
        let request_id = request.request_id.clone();

        run_stage::<Analyze, _, _>(&request_id, text_len, || async {
            let analysis = text::analyze(&request.text);
            let report_request = ReportRequest {
                request_id: request.request_id,
                word_frequencies: analysis.top_words.clone(),
                total_words: analysis.total_words,
                unique_words: analysis.unique_words,
                original_length: request.original_length,
                cleaned_length: text_len,
            };
            let report = self.downstream.call(&report_request).await?;

            Ok(AnalyzeResponse {
                status: Status::Success,
                message: format!(
                    "Analyzed {} words ({} unique)",
                    analysis.total_words, analysis.unique_words
                ),
                top_words: analysis.top_words,
                total_words: analysis.total_words,
                unique_words: analysis.unique_words,
                report: report.report,
            })
        })
        .await
    }
}

// ============================================================================
// Report
// ============================================================================

/// Terminal stage: renders the report. Never calls downstream.
#[derive(Debug, Default)]
pub struct ReportProcessor;

impl ReportProcessor {
    /// Create the terminal processor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StageService<Report> for ReportProcessor {
    async fn handle(&self, request: ReportRequest) -> ReportResponse {
        let started = Instant::now();
        let request_id = request.request_id.clone();

        run_stage::<Report, _, _>(&request_id, 0, || async {
            let body = text::render_report_body(&request);
            let processing_time = started.elapsed().as_secs_f64();
            let report = text::finish_report(body, processing_time);

            Ok(ReportResponse {
                status: Status::Success,
                message: "Report generated".to_string(),
                report,
                processing_time,
            })
        })
        .await
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
