//! End-to-end tests: every stage runs as real routers and processors on
//! loopback ports, wired together from one `PipelineConfig`, and the client
//! drives the chain through the ingest router.
//!
//! Dead replicas are addresses whose listener was bound and dropped, so
//! connecting to them is refused immediately.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use text_pipeline::router::RouterStats;
use text_pipeline::{server, HttpTransport, PipelineClient, PipelineConfig, Stage};

// ============================================================================
// Test Infrastructure
// ============================================================================

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr").to_string();
    (listener, addr)
}

async fn closed_addr() -> String {
    let (listener, addr) = bind().await;
    drop(listener);
    addr
}

/// Start a full pipeline. For stage `i`, `dead[i]` unreachable replicas come
/// first in the replica set, followed by `live[i]` real processors.
async fn spawn_pipeline(live: [usize; 4], dead: [usize; 4]) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    let mut routers = Vec::new();
    let mut processors = Vec::new();

    for (i, stage) in Stage::ALL.into_iter().enumerate() {
        let (router_listener, router_addr) = bind().await;
        routers.push((stage, router_listener));

        let mut replicas = Vec::new();
        for _ in 0..dead[i] {
            replicas.push(closed_addr().await);
        }
        for _ in 0..live[i] {
            let (listener, addr) = bind().await;
            replicas.push(addr);
            processors.push((stage, listener));
        }

        let stage_config = config.stages.get_mut(stage);
        stage_config.router = router_addr;
        stage_config.replicas = replicas;
        stage_config.replica_timeout_ms = 5_000;
        stage_config.downstream_timeout_ms = 10_000;
    }

    for (stage, listener) in routers {
        let app = server::build_router(&config, stage, HttpTransport::new())
            .expect("every stage has at least one replica");
        tokio::spawn(server::serve(listener, app, std::future::pending()));
    }
    for (stage, listener) in processors {
        let app = server::build_processor(&config, stage, HttpTransport::new());
        tokio::spawn(server::serve(listener, app, std::future::pending()));
    }
    config
}

fn client(config: &PipelineConfig) -> PipelineClient {
    PipelineClient::from_config(config, Arc::new(HttpTransport::new()))
        .with_timeouts(Duration::from_secs(10), Duration::from_secs(20))
}

async fn router_stats(config: &PipelineConfig, stage: Stage) -> RouterStats {
    reqwest::get(format!("http://{}/stats", config.stage(stage).router))
        .await
        .expect("stats request")
        .json()
        .await
        .expect("stats body")
}

// ============================================================================
// Happy Path
// ============================================================================

#[tokio::test]
async fn test_full_chain_returns_word_count_and_report() {
    let config = spawn_pipeline([2, 2, 2, 1], [0; 4]).await;
    let input = "The cat sat on the mat. The cat ran!";

    let outcome = client(&config).run_once(input).await;

    assert!(outcome.success, "run failed: {}", outcome.message);
    assert_eq!(outcome.word_count, 9);
    assert!(outcome
        .message
        .starts_with("Text processed successfully through pipeline"));

    let report = &outcome.report;
    assert!(report.contains("TEXT ANALYSIS REPORT"));
    assert!(report.contains(&format!("Request ID: {}", outcome.request_id)));
    assert!(report.contains("Total Words: 9"));
    assert!(report.contains("Unique Words: 6"));
    assert!(report.contains(&format!(
        "Original Length: {} chars",
        input.chars().count()
    )));
    assert!(report.contains("Cleaned Length: 34 chars"));
    assert!(report.contains("1. 'the' - 3 times"));
    assert!(report.contains("2. 'cat' - 2 times"));
}

#[tokio::test]
async fn test_chunked_run_over_live_pipeline_sums_words() {
    let config = spawn_pipeline([2, 2, 2, 2], [0; 4]).await;
    let text: Vec<String> = (0..40).map(|i| format!("word{i}")).collect();
    let text = text.join(" ");

    let result = client(&config)
        .run_chunked(&text, 4)
        .await
        .expect("non-zero chunk count");

    assert_eq!(result.success_count, 4);
    assert_eq!(result.failure_count, 0);
    assert_eq!(result.total_words, 40);
    for chunk in &result.outcomes {
        assert!(chunk.outcome.report.contains(&chunk.outcome.request_id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_runs_all_complete_and_spread_over_replicas() {
    let config = spawn_pipeline([3, 3, 3, 3], [0; 4]).await;
    let client = client(&config);

    let runs = (0..12).map(|i| {
        let client = client.clone();
        async move { client.run_once(&format!("concurrent run number {i}")).await }
    });
    let outcomes = futures::future::join_all(runs).await;

    assert!(outcomes.iter().all(|o| o.success));
    assert!(outcomes.iter().all(|o| o.word_count == 4));

    let stats = router_stats(&config, Stage::Analyze).await;
    assert!(stats.replicas.iter().all(|r| r.requests == 4));
}

#[tokio::test]
async fn test_health_endpoint_names_stage_and_role() {
    let config = spawn_pipeline([1, 1, 1, 1], [0; 4]).await;
    let body: Value = reqwest::get(format!("http://{}/health", config.stage(Stage::Clean).router))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body");
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["stage"], "clean");
    assert_eq!(body["role"], "router");
}

// ============================================================================
// Failover and Failure Propagation
// ============================================================================

#[tokio::test]
async fn test_router_fails_over_past_dead_replica() {
    let config = spawn_pipeline([1, 1, 1, 1], [1, 1, 1, 1]).await;
    let client = client(&config);

    for _ in 0..4 {
        let outcome = client.run_once("fail over please").await;
        assert!(outcome.success, "run failed: {}", outcome.message);
        assert_eq!(outcome.word_count, 3);
    }

    let stats = router_stats(&config, Stage::Clean).await;
    assert_eq!(stats.exhausted, 0);
    let dead = &stats.replicas[0];
    let live = &stats.replicas[1];
    assert!(dead.requests >= 1, "dead replica was never tried");
    assert_eq!(dead.errors, dead.requests);
    assert_eq!(live.requests, 4);
    assert_eq!(live.errors, 0);
}

#[tokio::test]
async fn test_all_ingest_replicas_down_reports_exhaustion() {
    let config = spawn_pipeline([0, 1, 1, 1], [2, 0, 0, 0]).await;

    let outcome = client(&config).run_once("nobody home").await;

    assert!(!outcome.success);
    assert_eq!(outcome.word_count, 0);
    assert!(outcome.report.is_empty());
    assert!(
        outcome
            .message
            .contains("All Ingest replicas failed after 2 attempts"),
        "got: {}",
        outcome.message
    );
}

#[tokio::test]
async fn test_terminal_stage_failure_propagates_to_client() {
    let config = spawn_pipeline([1, 1, 1, 0], [0, 0, 0, 1]).await;

    let outcome = client(&config).run_once("never reaches the report").await;

    assert!(!outcome.success);
    assert!(
        outcome.message.contains("All Report replicas failed"),
        "got: {}",
        outcome.message
    );
    assert!(outcome.message.contains("Failed to call Report service"));
    assert!(outcome.message.contains("Pipeline failed"));
}

#[tokio::test]
async fn test_empty_request_id_is_rejected_before_routing() {
    let config = spawn_pipeline([1, 1, 1, 1], [0; 4]).await;
    let url = format!("http://{}/v1/ingest", config.ingest_router());

    let resp = reqwest::Client::new()
        .post(&url)
        .json(&json!({ "request_id": "", "text": "hello" }))
        .send()
        .await
        .expect("post");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.expect("json body");
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "invalid request: request_id must not be empty");

    let stats = router_stats(&config, Stage::Ingest).await;
    assert_eq!(stats.replicas[0].requests, 0, "no replica may be attempted");
}
