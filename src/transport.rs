//! # Stage transport
//!
//! ## Responsibility
//! Perform one request/response call against one address for one stage
//! contract, under a caller-supplied timeout, and classify the outcome.
//!
//! ## Guarantees
//! - Every failure maps to exactly one of [`PipelineError::Transport`],
//!   [`PipelineError::Timeout`] or [`PipelineError::Backend`].
//! - A decoded response with `status = error` is never returned as `Ok`.
//! - No retries: one call is one attempt.
//!
//! ## NOT Responsible For
//! - Choosing which replica to call (that belongs to `router`)
//! - Deciding what to do with a failure (callers fail over or propagate)

use std::time::Duration;

use async_trait::async_trait;

use crate::protocol::WireResponse;
use crate::stage::{Stage, StageContract};
use crate::PipelineError;

/// Longest slice of an undecodable error body quoted in a failure message.
const MAX_QUOTED_BODY: usize = 200;

/// One call to one stage endpoint.
///
/// Object-safe so routers and processors can hold an
/// `Arc<dyn StageTransport<C>>` and tests can substitute in-memory fakes.
#[async_trait]
pub trait StageTransport<C: StageContract>: Send + Sync {
    /// Send `request` to the stage endpoint at `addr` and wait at most
    /// `timeout` for the answer.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::Transport`] if the backend is unreachable.
    /// - [`PipelineError::Timeout`] if `timeout` elapses first.
    /// - [`PipelineError::Backend`] if the backend answered with an error.
    async fn call(
        &self,
        addr: &str,
        request: &C::Request,
        timeout: Duration,
    ) -> Result<C::Response, PipelineError>;
}

/// JSON-over-HTTP transport backed by a shared [`reqwest::Client`].
///
/// Cloning is cheap; the connection pool is shared.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh connection pool.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reuse an existing client (custom TLS roots, proxies, pool sizes, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

/// Build the endpoint URL for `stage` at `addr`.
///
/// Bare `host:port` addresses are treated as plain HTTP.
pub fn endpoint(addr: &str, stage: Stage) -> String {
    let base = addr.trim().trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}{}", stage.rpc_path())
    } else {
        format!("http://{base}{}", stage.rpc_path())
    }
}

fn classify(addr: &str, timeout: Duration, err: reqwest::Error) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout {
            addr: addr.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        PipelineError::Transport {
            addr: addr.to_string(),
            detail: err.to_string(),
        }
    }
}

fn quote_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.chars().count() > MAX_QUOTED_BODY {
        let cut: String = text.chars().take(MAX_QUOTED_BODY).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

#[async_trait]
impl<C: StageContract> StageTransport<C> for HttpTransport {
    async fn call(
        &self,
        addr: &str,
        request: &C::Request,
        timeout: Duration,
    ) -> Result<C::Response, PipelineError> {
        let url = endpoint(addr, C::STAGE);

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| classify(addr, timeout, e))?;

        let http_status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| classify(addr, timeout, e))?;

        match serde_json::from_slice::<C::Response>(&body) {
            Ok(decoded) => {
                if let Some(message) = decoded.failure() {
                    return Err(PipelineError::Backend {
                        addr: addr.to_string(),
                        message: message.to_string(),
                    });
                }
                if !http_status.is_success() {
                    return Err(PipelineError::Backend {
                        addr: addr.to_string(),
                        message: format!("HTTP {http_status}"),
                    });
                }
                Ok(decoded)
            }
            Err(e) if http_status.is_success() => Err(PipelineError::Backend {
                addr: addr.to_string(),
                message: format!("undecodable {} response: {e}", C::STAGE),
            }),
            Err(_) => Err(PipelineError::Backend {
                addr: addr.to_string(),
                message: format!("HTTP {http_status}: {}", quote_body(&body)),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_prefixes_bare_addresses() {
        assert_eq!(
            endpoint("service2:8052", Stage::Clean),
            "http://service2:8052/v1/clean"
        );
    }

    #[test]
    fn test_endpoint_keeps_explicit_scheme_and_trims_slash() {
        assert_eq!(
            endpoint("https://lb.internal:8443/", Stage::Report),
            "https://lb.internal:8443/v1/report"
        );
    }

    #[test]
    fn test_quote_body_truncates_long_bodies() {
        let body = "x".repeat(500);
        let quoted = quote_body(body.as_bytes());
        assert!(quoted.ends_with("..."));
        assert_eq!(quoted.len(), MAX_QUOTED_BODY + 3);
    }
}
