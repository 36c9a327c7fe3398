//! # Stage identities and contracts
//!
//! ## Responsibility
//! Name the four pipeline stages and bind each one to its wire request and
//! response types, so routers, processors, transports and servers can be
//! written once and instantiated per stage.
//!
//! ## Guarantees
//! - One contract per stage: a router and the processors it fronts share
//!   the same [`StageContract`] and therefore the same endpoint and schema.
//! - Zero-sized markers: [`Ingest`], [`Clean`], [`Analyze`] and [`Report`]
//!   are uninhabited and exist only at the type level.
//!
//! ## NOT Responsible For
//! - Serialization details (see `protocol`)
//! - Selecting replicas (see `router`)

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::protocol::{
    AnalyzeRequest, AnalyzeResponse, CleanRequest, CleanResponse, IngestRequest, IngestResponse,
    ReportRequest, ReportResponse, WireRequest, WireResponse,
};
use crate::PipelineError;

/// One step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Receives raw text from the client.
    Ingest,
    /// Normalises the text.
    Clean,
    /// Computes word statistics.
    Analyze,
    /// Renders the final report. Terminal stage.
    Report,
}

impl Stage {
    /// All stages in chain order.
    pub const ALL: [Stage; 4] = [Stage::Ingest, Stage::Clean, Stage::Analyze, Stage::Report];

    /// Lowercase identifier used in metric labels, span fields and config keys.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Clean => "clean",
            Self::Analyze => "analyze",
            Self::Report => "report",
        }
    }

    /// Capitalised name used in human-readable messages.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Ingest => "Ingest",
            Self::Clean => "Clean",
            Self::Analyze => "Analyze",
            Self::Report => "Report",
        }
    }

    /// HTTP path of this stage's single RPC endpoint.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn rpc_path(self) -> &'static str {
        match self {
            Self::Ingest => "/v1/ingest",
            Self::Clean => "/v1/clean",
            Self::Analyze => "/v1/analyze",
            Self::Report => "/v1/report",
        }
    }

    /// The stage this one calls, or `None` for the terminal stage.
    ///
    /// # Panics
    ///
    /// This function never panics.
    pub fn next(self) -> Option<Stage> {
        match self {
            Self::Ingest => Some(Self::Clean),
            Self::Clean => Some(Self::Analyze),
            Self::Analyze => Some(Self::Report),
            Self::Report => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ingest" | "input" => Ok(Self::Ingest),
            "clean" | "preprocess" => Ok(Self::Clean),
            "analyze" | "analysis" => Ok(Self::Analyze),
            "report" => Ok(Self::Report),
            other => Err(PipelineError::ConfigError(format!("unknown stage '{other}'"))),
        }
    }
}

/// Binds a stage to its request and response schema.
///
/// Implemented by the uninhabited marker types below. Everything generic over
/// a stage (`Router<C>`, `Downstream<C>`, `StageTransport<C>`, the server
/// builder) is parameterised by one of these.
pub trait StageContract: Send + Sync + 'static {
    /// The stage this contract belongs to.
    const STAGE: Stage;
    /// Inbound message.
    type Request: WireRequest + Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    /// Outbound message.
    type Response: WireResponse + Serialize + DeserializeOwned + Send + Sync + 'static;
}

/// Contract marker for the ingest stage.
#[derive(Debug)]
pub enum Ingest {}

/// Contract marker for the clean stage.
#[derive(Debug)]
pub enum Clean {}

/// Contract marker for the analyze stage.
#[derive(Debug)]
pub enum Analyze {}

/// Contract marker for the report stage.
#[derive(Debug)]
pub enum Report {}

impl StageContract for Ingest {
    const STAGE: Stage = Stage::Ingest;
    type Request = IngestRequest;
    type Response = IngestResponse;
}

impl StageContract for Clean {
    const STAGE: Stage = Stage::Clean;
    type Request = CleanRequest;
    type Response = CleanResponse;
}

impl StageContract for Analyze {
    const STAGE: Stage = Stage::Analyze;
    type Request = AnalyzeRequest;
    type Response = AnalyzeResponse;
}

impl StageContract for Report {
    const STAGE: Stage = Stage::Report;
    type Request = ReportRequest;
    type Response = ReportResponse;
}
