//! Stage transform and routing benchmarks.
//!
//! Measures the pure per-stage work (clean, analyze, render) and the
//! router's per-call overhead against an in-memory transport, so network
//! cost is excluded.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tokio::runtime::Runtime;

use text_pipeline::client::split_into_chunks;
use text_pipeline::protocol::{ReportRequest, ReportResponse, Status};
use text_pipeline::{text, PipelineError, Report, Router, StageTransport};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const PARAGRAPH: &str = "Distributed systems are computer systems in which components \
located on networked computers communicate and coordinate their actions by passing \
messages. The components interact with each other in order to achieve a common goal!";

fn corpus(repeats: usize) -> String {
    PARAGRAPH.repeat(repeats)
}

struct InstantReport;

#[async_trait]
impl StageTransport<Report> for InstantReport {
    async fn call(
        &self,
        _addr: &str,
        request: &ReportRequest,
        _timeout: Duration,
    ) -> Result<ReportResponse, PipelineError> {
        Ok(ReportResponse {
            status: Status::Success,
            message: "Report generated".to_string(),
            report: request.request_id.clone(),
            processing_time: 0.0,
        })
    }
}

// ---------------------------------------------------------------------------
// Bench: text transforms at increasing input sizes
// ---------------------------------------------------------------------------

fn bench_clean(c: &mut Criterion) {
    let mut group = c.benchmark_group("clean");
    for repeats in [1usize, 100, 1_000] {
        let input = corpus(repeats);
        group.bench_with_input(BenchmarkId::from_parameter(repeats), &input, |b, input| {
            b.iter(|| black_box(text::clean(input)))
        });
    }
    group.finish();
}

fn bench_analyze(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze");
    for repeats in [1usize, 100, 1_000] {
        let cleaned = text::clean(&corpus(repeats)).text;
        group.bench_with_input(BenchmarkId::from_parameter(repeats), &cleaned, |b, input| {
            b.iter(|| black_box(text::analyze(input)))
        });
    }
    group.finish();
}

fn bench_render_report(c: &mut Criterion) {
    let cleaned = text::clean(&corpus(100));
    let analysis = text::analyze(&cleaned.text);
    let request = ReportRequest {
        request_id: "bench-1".to_string(),
        word_frequencies: analysis.top_words,
        total_words: analysis.total_words,
        unique_words: analysis.unique_words,
        original_length: cleaned.original_length,
        cleaned_length: cleaned.cleaned_length,
    };

    c.bench_function("render_report", |b| {
        b.iter(|| black_box(text::render_report(&request, 0.001)))
    });
}

fn bench_split_into_chunks(c: &mut Criterion) {
    let input = corpus(1_000);
    let mut group = c.benchmark_group("split_into_chunks");
    for n in [1usize, 4, 16] {
        group.bench_with_input(BenchmarkId::new("words", n), &n, |b, &n| {
            b.iter(|| black_box(split_into_chunks(&input, n, usize::MAX)))
        });
        group.bench_with_input(BenchmarkId::new("chars", n), &n, |b, &n| {
            b.iter(|| black_box(split_into_chunks(&input, n, 0)))
        });
    }
    group.finish();
}

// ---------------------------------------------------------------------------
// Bench: router overhead with an instant backend
// ---------------------------------------------------------------------------

fn bench_router_route(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let transport: Arc<dyn StageTransport<Report>> = Arc::new(InstantReport);
    let router = Router::<Report>::new(
        ["r1:1", "r2:2", "r3:3"],
        Duration::from_secs(1),
        transport,
    )
    .expect("non-empty replica set");
    let request = ReportRequest {
        request_id: "bench-route".to_string(),
        word_frequencies: Vec::new(),
        total_words: 0,
        unique_words: 0,
        original_length: 0,
        cleaned_length: 0,
    };

    c.bench_function("router_route_instant_backend", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(router.route(&request).await) })
    });
}

criterion_group!(
    benches,
    bench_clean,
    bench_analyze,
    bench_render_report,
    bench_split_into_chunks,
    bench_router_route
);
criterion_main!(benches);
