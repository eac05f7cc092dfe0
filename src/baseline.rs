//! On-disk baseline data model: run metadata, iteration records, and the
//! listing/search projections. Field names serialize as camelCase so stores
//! captured by older tooling remain readable.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::outcome::Headers;
use crate::protocol::Protocol;

/// Metadata for a whole captured run, persisted as `metadata.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunMetadata {
    pub run_id: String,
    pub service_name: String,
    /// Capture date, `yyyyMMdd`.
    pub capture_date: String,
    /// ISO-8601 capture timestamp with offset.
    pub capture_timestamp: String,
    pub test_type: Protocol,
    pub base_url: String,
    pub operation: String,
    pub total_iterations: usize,
    pub description: Option<String>,
    pub tags: Vec<String>,
    /// Snapshot of the configuration the run was captured with.
    pub config_used: IndexMap<String, serde_json::Value>,
}

/// Request-side metadata for one iteration, persisted as
/// `request-metadata.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IterationMetadata {
    pub iteration_number: usize,
    pub timestamp: String,
    pub tokens_used: IndexMap<String, String>,
    pub endpoint: String,
    pub method: String,
    pub soap_action: Option<String>,
    /// Auth summary with secrets masked.
    pub authentication: IndexMap<String, String>,
    pub request_size: Option<usize>,
}

/// Response-side metadata for one iteration, persisted as
/// `response-metadata.json`. Fixed fields plus an open extension map for
/// protocol-specific extras.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseMetadata {
    pub status_code: u16,
    /// Round-trip duration in milliseconds.
    pub duration: u64,
    pub timestamp: String,
    pub content_type: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// One captured iteration: exact request and response, immutable once written.
#[derive(Debug, Clone, Default)]
pub struct BaselineIteration {
    /// 1-based, contiguous within a run.
    pub iteration_number: usize,
    pub request_payload: Option<String>,
    pub request_headers: Headers,
    pub request_metadata: IterationMetadata,
    pub response_payload: Option<String>,
    pub response_headers: Headers,
    pub response_metadata: ResponseMetadata,
}

/// A fully loaded baseline run.
#[derive(Debug, Clone)]
pub struct BaselineRun {
    pub metadata: RunMetadata,
    pub iterations: Vec<BaselineIteration>,
}

/// Listing projection for one run, derived from its `metadata.json`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInfo {
    pub run_id: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub total_iterations: usize,
    pub timestamp: String,
}

/// A full-text search hit inside the baseline store. Read-only projection,
/// never persisted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub service_name: Option<String>,
    pub protocol: Option<String>,
    pub date: Option<String>,
    pub run_id: Option<String>,
    pub iteration: Option<String>,
    pub file_path: String,
    pub snippet: String,
}
