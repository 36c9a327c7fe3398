//! # Stage router
//!
//! ## Responsibility
//! Front one stage with a fixed set of homogeneous replicas: pick replicas in
//! round-robin order, forward the request, and fail over to the next replica
//! until one succeeds or every replica has been tried once.
//!
//! ## Guarantees
//! - Bounded: one incoming request makes at most `R` attempts and never
//!   visits the same replica twice, even under concurrent requests.
//! - Race-free rotation: the cursor advance is a single atomic
//!   read-modify-write and always stays in `[0, R)`.
//! - Stateless routing decision: per-replica counters are metrics only;
//!   a replica that failed before is still eligible on the next request.
//! - Transparent: a successful replica's response is returned untouched.
//!
//! ## NOT Responsible For
//! - Health checks, weights, circuit breaking or backoff
//! - Discovering replicas (the set is fixed at construction)
//! - Transforming payloads (that belongs to `processor`)

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn, Instrument, Span};

use crate::metrics;
use crate::processor::StageService;
use crate::protocol::{WireRequest, WireResponse};
use crate::stage::{Stage, StageContract};
use crate::transport::StageTransport;
use crate::{validate_request_id, PipelineError};

/// One backend address plus its counters.
#[derive(Debug)]
struct Replica {
    addr: String,
    requests: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time counters for one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStats {
    /// Replica address.
    pub addr: String,
    /// Attempts routed to this replica.
    pub requests: u64,
    /// Attempts that failed.
    pub errors: u64,
}

/// Point-in-time view of a router.
///
/// Counters are read with relaxed ordering and may be slightly stale
/// relative to each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Stage this router fronts.
    pub stage: Stage,
    /// Index of the next candidate replica.
    pub cursor: usize,
    /// Requests that exhausted every replica.
    pub exhausted: u64,
    /// Per-replica counters, in replica-set order.
    pub replicas: Vec<ReplicaStats>,
}

/// Round-robin router with failover, generic over the stage contract it
/// fronts.
///
/// Thread-safe: the rotation cursor and every counter are atomics, so one
/// instance is shared by all concurrently handled requests behind an `Arc`.
pub struct Router<C: StageContract> {
    replicas: Box<[Replica]>,
    cursor: AtomicUsize,
    exhausted: AtomicU64,
    timeout: Duration,
    transport: Arc<dyn StageTransport<C>>,
}

impl<C: StageContract> std::fmt::Debug for Router<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("stage", &C::STAGE)
            .field("replicas", &self.replicas)
            .field("cursor", &self.cursor)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<C: StageContract> Router<C> {
    /// Create a router over `replicas`, in the given order.
    ///
    /// # Arguments
    ///
    /// * `replicas`: Backend addresses; fixed for the router's lifetime.
    /// * `timeout`: Per-attempt timeout.
    /// * `transport`: How to reach a replica.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::ConfigError`] if `replicas` is empty.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new<I, S>(
        replicas: I,
        timeout: Duration,
        transport: Arc<dyn StageTransport<C>>,
    ) -> Result<Self, PipelineError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let replicas: Box<[Replica]> = replicas
            .into_iter()
            .map(|addr| Replica {
                addr: addr.into(),
                requests: AtomicU64::new(0),
                errors: AtomicU64::new(0),
            })
            .collect();

        if replicas.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "{} router needs at least one replica",
                C::STAGE
            )));
        }

        info!(
            stage = %C::STAGE,
            replicas = replicas.len(),
            timeout_ms = timeout.as_millis() as u64,
            "router initialised"
        );
        for replica in replicas.iter() {
            debug!(stage = %C::STAGE, replica = %replica.addr, "replica registered");
        }

        Ok(Self {
            replicas,
            cursor: AtomicUsize::new(0),
            exhausted: AtomicU64::new(0),
            timeout,
            transport,
        })
    }

    /// Stage this router fronts.
    pub fn stage(&self) -> Stage {
        C::STAGE
    }

    /// Number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Always `false`; construction rejects empty replica sets.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Replica addresses in rotation order.
    pub fn replica_addrs(&self) -> impl Iterator<Item = &str> {
        self.replicas.iter().map(|r| r.addr.as_str())
    }

    /// Index of the next candidate replica.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Acquire)
    }

    /// Advance the shared cursor by one, returning the index it pointed at.
    fn advance(&self) -> usize {
        let len = self.replicas.len();
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| Some((c + 1) % len))
        {
            Ok(prev) | Err(prev) => prev,
        }
    }

    /// Forward `request` to the first replica that answers successfully.
    ///
    /// Replicas are tried in rotation order starting at the shared cursor;
    /// the cursor is advanced once per attempt so it always points at the
    /// next candidate. Transport failures, timeouts and backend-reported
    /// errors are all treated the same: count it, move on.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InvalidRequest`] if `request_id` is empty; no
    ///   replica is attempted.
    /// - [`PipelineError::Exhausted`] once every replica has failed once.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub async fn route(&self, request: &C::Request) -> Result<C::Response, PipelineError> {
        validate_request_id(request.request_id())?;

        let span = tracing::info_span!(
            "router.route",
            stage = %C::STAGE,
            request_id = %request.request_id(),
            attempts = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        self.route_inner(request).instrument(span).await
    }

    async fn route_inner(&self, request: &C::Request) -> Result<C::Response, PipelineError> {
        let started = Instant::now();
        let len = self.replicas.len();
        let stage = C::STAGE.as_str();
        let mut last_error: Option<PipelineError> = None;

        let first = self.advance();
        for attempt in 0..len {
            if attempt > 0 {
                self.advance();
            }
            let replica = &self.replicas[(first + attempt) % len];

            replica.requests.fetch_add(1, Ordering::Relaxed);
            metrics::inc_router_attempt(stage, &replica.addr);
            debug!(replica = %replica.addr, attempt = attempt + 1, "routing request");

            match self
                .transport
                .call(&replica.addr, request, self.timeout)
                .await
            {
                Ok(response) => {
                    let span = Span::current();
                    span.record("attempts", attempt + 1);
                    span.record("duration_ms", started.elapsed().as_millis() as u64);
                    span.record("outcome", "ok");
                    info!(replica = %replica.addr, attempt = attempt + 1, "replica succeeded");
                    return Ok(response);
                }
                Err(e) => {
                    replica.errors.fetch_add(1, Ordering::Relaxed);
                    metrics::inc_router_error(stage, &replica.addr, e.kind());
                    warn!(
                        replica = %replica.addr,
                        attempt = attempt + 1,
                        error_kind = e.kind(),
                        error = %e,
                        "replica failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        self.exhausted.fetch_add(1, Ordering::Relaxed);
        metrics::inc_router_exhausted(stage);

        let span = Span::current();
        span.record("attempts", len);
        span.record("duration_ms", started.elapsed().as_millis() as u64);
        span.record("outcome", "exhausted");

        let err = PipelineError::Exhausted {
            stage: C::STAGE.display_name().to_string(),
            attempts: len,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no replica attempted".to_string()),
        };
        error!(error = %err, "all replicas exhausted");
        Err(err)
    }

    /// Snapshot of the cursor and counters.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            stage: C::STAGE,
            cursor: self.cursor(),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            replicas: self
                .replicas
                .iter()
                .map(|r| ReplicaStats {
                    addr: r.addr.clone(),
                    requests: r.requests.load(Ordering::Relaxed),
                    errors: r.errors.load(Ordering::Relaxed),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl<C: StageContract> StageService<C> for Router<C> {
    async fn handle(&self, request: C::Request) -> C::Response {
        match self.route(&request).await {
            Ok(response) => response,
            Err(e) => C::Response::failed(e.to_string()),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
