//! # Stage server
//!
//! ## Responsibility
//! Expose one [`StageService`] (a router or a processor) over HTTP: the
//! stage's RPC endpoint plus `/health`, `/metrics` and, for routers,
//! `/stats`. Also wires a whole process from a [`PipelineConfig`].
//!
//! ## Guarantees
//! - The RPC body is always the stage's response schema, for every outcome
//! - Status codes: 200 for `success`, 502 for an `error` produced by the
//!   service, 400 for an invalid request, 413 for an oversized body
//! - Bounded: at most `workers` RPC calls are in flight per process
//!
//! ## NOT Responsible For
//! - Choosing replicas (that belongs to `router`)
//! - Transforming payloads (that belongs to `processor`)

use std::future::Future;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use tokio::net::TcpListener;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::processor::{
    AnalyzeProcessor, CleanProcessor, Downstream, IngestProcessor, ReportProcessor, StageService,
};
use crate::protocol::{WireRequest, WireResponse};
use crate::router::Router as StageRouter;
use crate::stage::{Analyze, Clean, Ingest, Report, Stage, StageContract};
use crate::transport::{HttpTransport, StageTransport};
use crate::{validate_request_id, PipelineError};

/// Per-process HTTP limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerLimits {
    /// Largest accepted request body, in bytes.
    pub max_message_bytes: usize,
    /// RPC calls handled concurrently; further calls wait.
    pub workers: usize,
}

/// What kind of process serves a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Round-robin router in front of the stage's replicas.
    Router,
    /// One replica of the stage.
    Processor,
}

impl Role {
    fn as_str(self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Processor => "processor",
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

fn respond<R: serde::Serialize>(status: StatusCode, body: R) -> Response {
    (status, Json(body)).into_response()
}

/// `POST /v1/<stage>`: decode, validate, delegate, map status.
async fn rpc_handler<C: StageContract>(
    State(service): State<Arc<dyn StageService<C>>>,
    payload: Result<Json<C::Request>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            let status = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                StatusCode::PAYLOAD_TOO_LARGE
            } else {
                StatusCode::BAD_REQUEST
            };
            warn!(stage = %C::STAGE, status = status.as_u16(), "rejected request body");
            let message = format!("invalid request body: {}", rejection.body_text());
            return respond(status, C::Response::failed(message));
        }
    };

    if let Err(e) = validate_request_id(request.request_id()) {
        return respond(StatusCode::BAD_REQUEST, C::Response::failed(e.to_string()));
    }

    let response = service.handle(request).await;
    let status = if response.status().is_success() {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    respond(status, response)
}

/// `GET /stats` on router processes.
async fn stats_handler<C: StageContract>(State(router): State<Arc<StageRouter<C>>>) -> Response {
    respond(StatusCode::OK, router.stats())
}

/// `GET /metrics`: Prometheus text exposition.
async fn metrics_handler() -> Response {
    (
        StatusCode::OK,
        [("Content-Type", "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
        .into_response()
}

// ============================================================================
// App builders
// ============================================================================

fn base_app<C: StageContract>(
    service: Arc<dyn StageService<C>>,
    role: Role,
    limits: ServerLimits,
) -> axum::Router {
    let rpc = axum::Router::new()
        .route(C::STAGE.rpc_path(), post(rpc_handler::<C>))
        .layer(ConcurrencyLimitLayer::new(limits.workers.max(1)))
        .layer(DefaultBodyLimit::max(limits.max_message_bytes))
        .with_state(service);

    let stage = C::STAGE;
    let health = move || async move {
        Json(serde_json::json!({
            "status": "healthy",
            "stage": stage.as_str(),
            "role": role.as_str(),
            "version": env!("CARGO_PKG_VERSION"),
        }))
    };

    rpc.route("/health", get(health))
        .route("/metrics", get(metrics_handler))
}

/// App for a processor (or any other service) of stage `C`.
///
/// # Panics
///
/// This function never panics.
pub fn service_app<C: StageContract>(
    service: Arc<dyn StageService<C>>,
    limits: ServerLimits,
) -> axum::Router {
    base_app(service, Role::Processor, limits).layer(TraceLayer::new_for_http())
}

/// App for the router of stage `C`, including `GET /stats`.
///
/// # Panics
///
/// This function never panics.
pub fn router_app<C: StageContract>(
    router: Arc<StageRouter<C>>,
    limits: ServerLimits,
) -> axum::Router {
    let service: Arc<dyn StageService<C>> = router.clone();
    let stats = axum::Router::new()
        .route("/stats", get(stats_handler::<C>))
        .with_state(router);

    base_app(service, Role::Router, limits)
        .merge(stats)
        .layer(TraceLayer::new_for_http())
}

fn stage_router_app<C: StageContract>(
    config: &PipelineConfig,
    transport: Arc<HttpTransport>,
) -> Result<axum::Router, PipelineError> {
    let stage = config.stage(C::STAGE);
    let transport: Arc<dyn StageTransport<C>> = transport;
    let router = StageRouter::<C>::new(
        stage.replicas.iter().cloned(),
        stage.replica_timeout(),
        transport,
    )?;
    Ok(router_app(
        Arc::new(router),
        ServerLimits {
            max_message_bytes: config.transport.max_message_bytes,
            workers: stage.router_workers,
        },
    ))
}

fn downstream<C: StageContract>(
    config: &PipelineConfig,
    from: Stage,
    transport: &Arc<HttpTransport>,
) -> Downstream<C> {
    let transport: Arc<dyn StageTransport<C>> = transport.clone();
    Downstream::new(
        config.stage(C::STAGE).router.clone(),
        config.stage(from).downstream_timeout(),
        transport,
    )
}

/// Build the app a router process for `stage` serves.
///
/// # Errors
///
/// Returns [`PipelineError::ConfigError`] if the stage has no replicas.
///
/// # Panics
///
/// This function never panics.
pub fn build_router(
    config: &PipelineConfig,
    stage: Stage,
    transport: HttpTransport,
) -> Result<axum::Router, PipelineError> {
    let transport = Arc::new(transport);
    match stage {
        Stage::Ingest => stage_router_app::<Ingest>(config, transport),
        Stage::Clean => stage_router_app::<Clean>(config, transport),
        Stage::Analyze => stage_router_app::<Analyze>(config, transport),
        Stage::Report => stage_router_app::<Report>(config, transport),
    }
}

/// Build the app a processor process for `stage` serves. Its downstream is
/// the next stage's router from `config`.
///
/// # Panics
///
/// This function never panics.
pub fn build_processor(
    config: &PipelineConfig,
    stage: Stage,
    transport: HttpTransport,
) -> axum::Router {
    let transport = Arc::new(transport);
    let limits = ServerLimits {
        max_message_bytes: config.transport.max_message_bytes,
        workers: config.stage(stage).processor_workers,
    };
    match stage {
        Stage::Ingest => service_app::<Ingest>(
            Arc::new(IngestProcessor::new(downstream(config, stage, &transport))),
            limits,
        ),
        Stage::Clean => service_app::<Clean>(
            Arc::new(CleanProcessor::new(downstream(config, stage, &transport))),
            limits,
        ),
        Stage::Analyze => service_app::<Analyze>(
            Arc::new(AnalyzeProcessor::new(downstream(config, stage, &transport))),
            limits,
        ),
        Stage::Report => service_app::<Report>(Arc::new(ReportProcessor::new()), limits),
    }
}

// ============================================================================
// Serve loop
// ============================================================================

/// Serve `app` on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns [`PipelineError::Other`] if the listener fails.
///
/// # Panics
///
/// This function never panics.
pub async fn serve<F>(
    listener: TcpListener,
    app: axum::Router,
    shutdown: F,
) -> Result<(), PipelineError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let local = listener
        .local_addr()
        .map_err(|e| PipelineError::Other(format!("listener has no local address: {e}")))?;
    info!(addr = %local, "stage server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| PipelineError::Other(format!("server on {local} failed: {e}")))?;

    info!(addr = %local, "stage server stopped");
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────
