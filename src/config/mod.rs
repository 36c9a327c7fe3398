//! # Pipeline topology configuration
//!
//! ## Responsibility
//! Describe the whole pipeline shape as one value: for every stage, the
//! router address, the replica set behind it, timeouts and worker pool
//! sizes; plus transport limits and client defaults.
//!
//! ## Guarantees
//! - Deterministic: the same TOML and environment always produce the same
//!   `PipelineConfig`
//! - Validated: a config returned by the loader satisfies every rule in
//!   [`validation`]
//! - Explicit topology: a processor's next hop is the next stage's router
//!   address taken from this value, never from ambient global state
//!
//! ## NOT Responsible For
//! - Starting servers (that belongs to `server`)
//! - Routing (that belongs to `router`)

pub mod loader;
pub mod validation;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stage::Stage;

pub use loader::{load_from_file, load_from_str};
pub use validation::ConfigError;

// ── Default value functions ──────────────────────────────────────────────

/// Default maximum request/response body: 100 MiB.
fn default_max_message_bytes() -> usize {
    100 * 1024 * 1024
}

/// Default router → replica timeout: 60 s.
fn default_replica_timeout_ms() -> u64 {
    60_000
}

/// Default processor → next router timeout: 30 s.
fn default_downstream_timeout_ms() -> u64 {
    30_000
}

fn default_router_workers() -> usize {
    20
}

fn default_processor_workers() -> usize {
    10
}

/// Default single-shot client timeout: 60 s.
fn default_client_timeout_ms() -> u64 {
    60_000
}

/// Default chunked/large-input client timeout: 300 s.
fn default_large_timeout_ms() -> u64 {
    300_000
}

/// Inputs longer than this many characters are chunked by character.
fn default_large_input_threshold_chars() -> usize {
    5 * 1024 * 1024
}

// ── Top-level config ─────────────────────────────────────────────────────

/// Root configuration for one pipeline deployment.
///
/// # Example
///
/// ```toml
/// [transport]
/// max_message_bytes = 104857600
///
/// [stages.ingest]
/// router = "127.0.0.1:8061"
/// replicas = ["127.0.0.1:8051", "127.0.0.1:8055"]
///
/// # ... clean, analyze and report follow the same shape
///
/// [client]
/// timeout_ms = 60000
/// ```
///
/// # Panics
///
/// This type never panics during construction or access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Limits shared by every server.
    #[serde(default)]
    pub transport: TransportConfig,
    /// Per-stage topology.
    pub stages: StagesConfig,
    /// Client defaults.
    #[serde(default)]
    pub client: ClientConfig,
}

impl PipelineConfig {
    /// Settings of one stage.
    pub fn stage(&self, stage: Stage) -> &StageConfig {
        self.stages.get(stage)
    }

    /// Address a processor of `stage` calls: the next stage's router, or
    /// `None` for the terminal stage.
    pub fn next_router(&self, stage: Stage) -> Option<&str> {
        stage.next().map(|next| self.stage(next).router.as_str())
    }

    /// Address the client sends pipeline invocations to.
    pub fn ingest_router(&self) -> &str {
        self.client
            .ingest_router
            .as_deref()
            .unwrap_or(self.stages.ingest.router.as_str())
    }
}

impl Default for PipelineConfig {
    /// Local topology: routers on 8061-8064, replicas on the ports the
    /// docker-compose layout uses, all on the loopback interface.
    fn default() -> Self {
        fn local(router: u16, replicas: &[u16]) -> StageConfig {
            StageConfig::new(
                format!("127.0.0.1:{router}"),
                replicas.iter().map(|p| format!("127.0.0.1:{p}")),
            )
        }

        Self {
            transport: TransportConfig::default(),
            stages: StagesConfig {
                ingest: local(8061, &[8051, 8055, 8057, 8059]),
                clean: local(8062, &[8052, 8056, 8058, 8060]),
                analyze: local(8063, &[8053, 8065, 8067, 8069]),
                report: local(8064, &[8054, 8066, 8068]),
            },
            client: ClientConfig::default(),
        }
    }
}

// ── Transport ────────────────────────────────────────────────────────────

/// Limits applied by every stage server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransportConfig {
    /// Largest accepted request body, in bytes.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: default_max_message_bytes(),
        }
    }
}

// ── Stages ───────────────────────────────────────────────────────────────

/// Topology for all four stages. Every stage is required.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StagesConfig {
    /// Entry stage.
    pub ingest: StageConfig,
    /// Normalisation stage.
    pub clean: StageConfig,
    /// Word statistics stage.
    pub analyze: StageConfig,
    /// Terminal rendering stage.
    pub report: StageConfig,
}

impl StagesConfig {
    /// Settings of one stage.
    pub fn get(&self, stage: Stage) -> &StageConfig {
        match stage {
            Stage::Ingest => &self.ingest,
            Stage::Clean => &self.clean,
            Stage::Analyze => &self.analyze,
            Stage::Report => &self.report,
        }
    }

    /// Mutable settings of one stage.
    pub fn get_mut(&mut self, stage: Stage) -> &mut StageConfig {
        match stage {
            Stage::Ingest => &mut self.ingest,
            Stage::Clean => &mut self.clean,
            Stage::Analyze => &mut self.analyze,
            Stage::Report => &mut self.report,
        }
    }
}

/// One stage: its router, its replicas, and how long each hop may take.
///
/// # Panics
///
/// This type never panics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageConfig {
    /// Address the stage's router listens on; upstream processors call it.
    pub router: String,
    /// Replica addresses, in rotation order.
    pub replicas: Vec<String>,
    /// Per-attempt timeout from the router to a replica.
    #[serde(default = "default_replica_timeout_ms")]
    pub replica_timeout_ms: u64,
    /// Timeout for a processor's call into the next stage's router.
    #[serde(default = "default_downstream_timeout_ms")]
    pub downstream_timeout_ms: u64,
    /// Concurrent requests a router process handles.
    #[serde(default = "default_router_workers")]
    pub router_workers: usize,
    /// Concurrent requests a processor process handles.
    #[serde(default = "default_processor_workers")]
    pub processor_workers: usize,
}

impl StageConfig {
    /// Stage settings with every optional field at its default.
    pub fn new<I, S>(router: impl Into<String>, replicas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            router: router.into(),
            replicas: replicas.into_iter().map(Into::into).collect(),
            replica_timeout_ms: default_replica_timeout_ms(),
            downstream_timeout_ms: default_downstream_timeout_ms(),
            router_workers: default_router_workers(),
            processor_workers: default_processor_workers(),
        }
    }

    /// [`Self::replica_timeout_ms`] as a [`Duration`].
    pub fn replica_timeout(&self) -> Duration {
        Duration::from_millis(self.replica_timeout_ms)
    }

    /// [`Self::downstream_timeout_ms`] as a [`Duration`].
    pub fn downstream_timeout(&self) -> Duration {
        Duration::from_millis(self.downstream_timeout_ms)
    }
}

// ── Client ───────────────────────────────────────────────────────────────

/// Defaults for [`crate::client::PipelineClient`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// Ingest router to call. Falls back to `stages.ingest.router`.
    #[serde(default)]
    pub ingest_router: Option<String>,
    /// Single-shot timeout.
    #[serde(default = "default_client_timeout_ms")]
    pub timeout_ms: u64,
    /// Timeout for chunked runs and large inputs.
    #[serde(default = "default_large_timeout_ms")]
    pub large_timeout_ms: u64,
    /// Inputs longer than this are split by character instead of by word.
    #[serde(default = "default_large_input_threshold_chars")]
    pub large_input_threshold_chars: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ingest_router: None,
            timeout_ms: default_client_timeout_ms(),
            large_timeout_ms: default_large_timeout_ms(),
            large_input_threshold_chars: default_large_input_threshold_chars(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_router_follows_stage_order() {
        let config = PipelineConfig::default();
        assert_eq!(config.next_router(Stage::Ingest), Some("127.0.0.1:8062"));
        assert_eq!(config.next_router(Stage::Clean), Some("127.0.0.1:8063"));
        assert_eq!(config.next_router(Stage::Analyze), Some("127.0.0.1:8064"));
        assert_eq!(config.next_router(Stage::Report), None);
    }

    #[test]
    fn test_ingest_router_falls_back_to_stage_router() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.ingest_router(), "127.0.0.1:8061");
        config.client.ingest_router = Some("lb.example:9000".to_string());
        assert_eq!(config.ingest_router(), "lb.example:9000");
    }

    #[test]
    fn test_stage_config_new_applies_defaults() {
        let stage = StageConfig::new("r:1", ["a:1", "b:2"]);
        assert_eq!(stage.replicas, vec!["a:1", "b:2"]);
        assert_eq!(stage.replica_timeout(), Duration::from_secs(60));
        assert_eq!(stage.downstream_timeout(), Duration::from_secs(30));
        assert_eq!(stage.router_workers, 20);
        assert_eq!(stage.processor_workers, 10);
    }

    #[test]
    fn test_default_topology_has_replicas_for_every_stage() {
        let config = PipelineConfig::default();
        for stage in Stage::ALL {
            assert!(!config.stage(stage).replicas.is_empty(), "{stage}");
        }
        assert_eq!(config.transport.max_message_bytes, 104_857_600);
        assert_eq!(config.client.large_input_threshold_chars, 5_242_880);
    }
}
