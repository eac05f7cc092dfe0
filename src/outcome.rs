//! Captured call outcomes and per-iteration comparison results.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::iteration::Iteration;

/// Header name → value. Insertion order preserved for faithful replay.
pub type Headers = IndexMap<String, String>;

/// Free-form observability metadata attached to a call outcome.
pub type CallMetadata = IndexMap<String, serde_json::Value>;

/// Everything captured from a single transport invocation. Immutable once
/// built; assembled in one pass via the `with_*` constructors so partially
/// populated outcomes never reach the diff engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOutcome {
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub request_headers: Headers,
    pub request_payload: Option<String>,
    pub response_headers: Headers,
    pub response_payload: Option<String>,
    /// Round-trip duration in milliseconds.
    pub duration_ms: u64,
    pub metadata: CallMetadata,
}

impl CallOutcome {
    pub fn new(url: &str, method: &str) -> Self {
        Self {
            url: url.to_string(),
            method: method.to_string(),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_request(mut self, headers: Headers, payload: Option<String>) -> Self {
        self.request_headers = headers;
        self.request_payload = payload;
        self
    }

    pub fn with_response(mut self, headers: Headers, payload: Option<String>) -> Self {
        self.response_headers = headers;
        self.response_payload = payload;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Is the status in the client/server error range?
    pub fn is_error_status(&self) -> bool {
        self.status_code >= 400
    }
}

/// Classification of a single comparison attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum MatchStatus {
    #[default]
    Match,
    Mismatch,
    Error,
}

/// Provenance of the baseline a result was captured into or compared against.
/// Present only when the run's comparison mode is BASELINE.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineProvenance {
    pub service_name: String,
    pub date: String,
    pub run_id: String,
    pub path: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub capture_timestamp: Option<String>,
}

/// Outcome of comparing one operation on one iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonResult {
    pub operation_name: String,
    pub iteration_tokens: Iteration,
    pub timestamp: String,
    /// Freshly captured outcome ("A" side).
    pub outcome_a: Option<CallOutcome>,
    /// Second live endpoint or baseline-derived outcome ("B" side). Absent
    /// when presenting a bare baseline record.
    pub outcome_b: Option<CallOutcome>,
    pub status: MatchStatus,
    pub error_message: Option<String>,
    /// Human-readable difference descriptions produced by the diff engine.
    pub differences: Vec<String>,
    pub baseline: Option<BaselineProvenance>,
}

impl ComparisonResult {
    pub fn new(operation_name: &str, tokens: Iteration) -> Self {
        Self {
            operation_name: operation_name.to_string(),
            iteration_tokens: tokens,
            timestamp: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            ..Self::default()
        }
    }

    /// A standalone ERROR result, used when a whole run aborts before any
    /// transport work happens.
    pub fn failure(operation_name: &str, message: &str) -> Self {
        let mut result = Self::new(operation_name, Iteration::new());
        result.status = MatchStatus::Error;
        result.error_message = Some(message.to_string());
        result
    }

    pub fn mark_error(&mut self, message: String) {
        self.status = MatchStatus::Error;
        self.error_message = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&MatchStatus::Match).unwrap(), "\"MATCH\"");
        assert_eq!(
            serde_json::to_string(&MatchStatus::Mismatch).unwrap(),
            "\"MISMATCH\""
        );
        assert_eq!(serde_json::to_string(&MatchStatus::Error).unwrap(), "\"ERROR\"");
    }

    #[test]
    fn test_outcome_builder_assembles_complete_value() {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        let outcome = CallOutcome::new("http://a/op", "POST")
            .with_status(200)
            .with_request(headers.clone(), Some("{}".to_string()))
            .with_response(headers, Some("{\"ok\":true}".to_string()))
            .with_duration(12);
        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.duration_ms, 12);
        assert!(!outcome.is_error_status());
    }

    #[test]
    fn test_failure_result() {
        let result = ComparisonResult::failure("op", "Baseline mode failed: boom");
        assert_eq!(result.status, MatchStatus::Error);
        assert!(result.error_message.as_deref().unwrap().contains("boom"));
    }
}
