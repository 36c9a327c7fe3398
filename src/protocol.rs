//! Wire schemas for the four stage contracts.
//!
//! All bodies are JSON. Every response carries `status` and `message` next to
//! its stage payload, so a failed call can always be reported with the
//! stage's own schema: [`WireResponse::failed`] builds that error shape with
//! a zero/empty payload.

use serde::{Deserialize, Serialize};

/// Outcome flag carried by every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// The stage (and everything downstream of it) succeeded.
    #[default]
    Success,
    /// Something on the path failed; see `message`.
    Error,
}

impl Status {
    /// `true` for [`Status::Success`].
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Common view over every stage request.
pub trait WireRequest {
    /// Correlation token shared by all hops of one pipeline invocation.
    fn request_id(&self) -> &str;
}

/// Common view over every stage response.
pub trait WireResponse: Sized {
    /// Outcome of the call.
    fn status(&self) -> Status;

    /// Human-readable detail.
    fn message(&self) -> &str;

    /// Error response with a zero/empty payload.
    fn failed(message: impl Into<String>) -> Self;

    /// The error detail if this response reports a failure.
    fn failure(&self) -> Option<&str> {
        match self.status() {
            Status::Success => None,
            Status::Error => Some(self.message()),
        }
    }
}

macro_rules! wire_request {
    ($ty:ty) => {
        impl WireRequest for $ty {
            fn request_id(&self) -> &str {
                &self.request_id
            }
        }
    };
}

macro_rules! wire_response {
    ($ty:ty) => {
        impl WireResponse for $ty {
            fn status(&self) -> Status {
                self.status
            }

            fn message(&self) -> &str {
                &self.message
            }

            fn failed(message: impl Into<String>) -> Self {
                Self {
                    status: Status::Error,
                    message: message.into(),
                    ..Default::default()
                }
            }
        }
    };
}

// ── Ingest ───────────────────────────────────────────────────────────────

/// Raw text submitted by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IngestRequest {
    /// Correlation token for the whole invocation.
    pub request_id: String,
    /// Raw input text.
    pub text: String,
}

/// End-to-end result returned to the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct IngestResponse {
    /// Outcome of the whole chain.
    pub status: Status,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
    /// Number of words in the cleaned text.
    #[serde(default)]
    pub word_count: u64,
    /// Rendered report from the terminal stage.
    #[serde(default)]
    pub report: String,
}

wire_request!(IngestRequest);
wire_response!(IngestResponse);

// ── Clean ────────────────────────────────────────────────────────────────

/// Text to normalise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CleanRequest {
    /// Correlation token for the whole invocation.
    pub request_id: String,
    /// Text exactly as ingested.
    pub text: String,
}

/// Normalised text plus the lengths before and after.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CleanResponse {
    /// Outcome of this stage and everything downstream.
    pub status: Status,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
    /// Lowercased, filtered, whitespace-collapsed text.
    #[serde(default)]
    pub cleaned_text: String,
    /// Input length in characters.
    #[serde(default)]
    pub original_length: u64,
    /// Output length in characters.
    #[serde(default)]
    pub cleaned_length: u64,
    /// Rendered report from the terminal stage.
    #[serde(default)]
    pub report: String,
}

wire_request!(CleanRequest);
wire_response!(CleanResponse);

// ── Analyze ──────────────────────────────────────────────────────────────

/// Cleaned text to analyse.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalyzeRequest {
    /// Correlation token for the whole invocation.
    pub request_id: String,
    /// Cleaned text.
    pub text: String,
    /// Length of the text before cleaning, forwarded for the report.
    #[serde(default)]
    pub original_length: u64,
}

/// One entry of the frequency table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WordFrequency {
    /// The token.
    pub word: String,
    /// Occurrences in the analysed text.
    pub count: u64,
}

impl WordFrequency {
    /// Convenience constructor.
    pub fn new(word: impl Into<String>, count: u64) -> Self {
        Self {
            word: word.into(),
            count,
        }
    }
}

/// Word statistics for the analysed text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AnalyzeResponse {
    /// Outcome of this stage and everything downstream.
    pub status: Status,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
    /// At most ten most frequent tokens, ties in first-occurrence order.
    #[serde(default)]
    pub top_words: Vec<WordFrequency>,
    /// Token count.
    #[serde(default)]
    pub total_words: u64,
    /// Distinct token count.
    #[serde(default)]
    pub unique_words: u64,
    /// Rendered report from the terminal stage.
    #[serde(default)]
    pub report: String,
}

wire_request!(AnalyzeRequest);
wire_response!(AnalyzeResponse);

// ── Report ───────────────────────────────────────────────────────────────

/// Everything the report renderer needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportRequest {
    /// Correlation token for the whole invocation.
    pub request_id: String,
    /// Frequency table from the analyze stage.
    #[serde(default)]
    pub word_frequencies: Vec<WordFrequency>,
    /// Token count.
    pub total_words: u64,
    /// Distinct token count.
    pub unique_words: u64,
    /// Length before cleaning.
    #[serde(default)]
    pub original_length: u64,
    /// Length after cleaning.
    #[serde(default)]
    pub cleaned_length: u64,
}

/// Rendered report and the time spent rendering it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportResponse {
    /// Outcome of the render.
    pub status: Status,
    /// Human-readable detail.
    #[serde(default)]
    pub message: String,
    /// Fixed-format textual summary.
    #[serde(default)]
    pub report: String,
    /// Seconds spent rendering.
    #[serde(default)]
    pub processing_time: f64,
}

wire_request!(ReportRequest);
wire_response!(ReportResponse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&Status::Success).ok().as_deref(),
            Some("\"success\"")
        );
        assert_eq!(
            serde_json::to_string(&Status::Error).ok().as_deref(),
            Some("\"error\"")
        );
    }

    #[test]
    fn test_failed_response_has_zero_payload() {
        let resp = AnalyzeResponse::failed("boom");
        assert_eq!(resp.status, Status::Error);
        assert_eq!(resp.message, "boom");
        assert!(resp.top_words.is_empty());
        assert_eq!(resp.total_words, 0);
        assert_eq!(resp.unique_words, 0);
        assert!(resp.report.is_empty());
    }

    #[test]
    fn test_failure_returns_message_only_on_error() {
        let ok = IngestResponse {
            status: Status::Success,
            message: "fine".to_string(),
            ..Default::default()
        };
        assert_eq!(ok.failure(), None);
        let bad = CleanResponse::failed("downstream gone");
        assert_eq!(bad.failure(), Some("downstream gone"));
    }

    #[test]
    fn test_analyze_request_original_length_defaults_to_zero() {
        let req: AnalyzeRequest =
            serde_json::from_str(r#"{"request_id":"r1","text":"a b"}"#).unwrap();
        assert_eq!(req.original_length, 0);
        assert_eq!(req.request_id(), "r1");
    }

    #[test]
    fn test_response_without_payload_fields_deserializes() {
        let resp: ReportResponse =
            serde_json::from_str(r#"{"status":"error","message":"nope"}"#).unwrap();
        assert_eq!(resp.failure(), Some("nope"));
        assert!(resp.report.is_empty());
    }
}
