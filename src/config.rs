//! Run configuration: endpoints, operations, tokens, and baseline settings.
//!
//! Loaded from JSON by the CLI; read-only during a run.

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::iteration::TokenSet;
use crate::outcome::Headers;
use crate::protocol::{BaselineOp, ComparisonMode, DestinationType, Protocol, Strategy};

fn default_max_iterations() -> usize {
    100
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("baselines")
}

fn default_method() -> String {
    "GET".to_string()
}

/// Accept numbers and booleans as token candidate values, normalising
/// everything to strings.
fn de_tokens<'de, D>(deserializer: D) -> Result<TokenSet, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: IndexMap<String, Vec<serde_json::Value>> = IndexMap::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(name, values)| {
            let values = values
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect();
            (name, values)
        })
        .collect())
}

/// Top-level configuration for one comparison run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub comparison_mode: ComparisonMode,
    pub test_type: Protocol,
    #[serde(deserialize_with = "de_tokens")]
    pub tokens: TokenSet,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(alias = "iterationController")]
    pub strategy: Strategy,
    /// Structural field names excluded from the diff regardless of value.
    pub ignored_fields: Vec<String>,
    /// Exclude header comparison entirely.
    pub ignore_headers: bool,
    /// Diff error responses instead of short-circuiting to ERROR.
    pub compare_error_responses: bool,
    #[serde(alias = "api1")]
    pub endpoint_a: Option<EndpointConfig>,
    #[serde(alias = "api2")]
    pub endpoint_b: Option<EndpointConfig>,
    pub baseline: Option<BaselineConfig>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            comparison_mode: ComparisonMode::default(),
            test_type: Protocol::default(),
            tokens: TokenSet::new(),
            max_iterations: default_max_iterations(),
            strategy: Strategy::default(),
            ignored_fields: Vec::new(),
            ignore_headers: false,
            compare_error_responses: false,
            endpoint_a: None,
            endpoint_b: None,
            baseline: None,
        }
    }
}

impl RunConfig {
    /// Load a run configuration from a JSON file.
    pub fn load(path: &Path) -> crate::errors::Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| crate::errors::DriftError::io(path, e))?;
        serde_json::from_str(&raw).map_err(|e| crate::errors::DriftError::json(path, e))
    }
}

/// One endpoint under test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointConfig {
    pub base_url: String,
    pub authentication: Option<Authentication>,
    pub operations: Vec<OperationConfig>,
}

/// A single operation on an endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OperationConfig {
    pub name: String,
    #[serde(default = "default_method")]
    pub method: String,
    pub path: Option<String>,
    pub headers: Headers,
    pub query_params: IndexMap<String, String>,
    /// Inline template text or a path to a template file; `{{token}}`
    /// placeholders are substituted per iteration.
    pub payload_template: Option<String>,
    pub soap_action: Option<String>,
    /// Messaging destination, used instead of `path` when the protocol is JMS.
    pub destination: Option<String>,
    pub destination_type: DestinationType,
}

/// Endpoint credentials. Paths may be rewritten to run-relative `certs/`
/// copies when a baseline is captured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Authentication {
    pub enable_auth: bool,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub use_mtls: bool,
    pub pfx_path: Option<String>,
    pub client_cert_path: Option<String>,
    pub client_key_path: Option<String>,
    pub ca_cert_path: Option<String>,
    pub passphrase: Option<String>,
}

impl Authentication {
    /// Observability projection of the credentials with secrets masked.
    pub fn summary(&self) -> IndexMap<String, String> {
        let mut info = IndexMap::new();
        if self.enable_auth {
            if let Some(client_id) = &self.client_id {
                info.insert("type".to_string(), "basic".to_string());
                info.insert("clientId".to_string(), client_id.clone());
            }
        }
        if self.use_mtls {
            for (key, value) in [
                ("pfxPath", &self.pfx_path),
                ("clientCertPath", &self.client_cert_path),
                ("clientKeyPath", &self.client_key_path),
                ("caCertPath", &self.ca_cert_path),
            ] {
                if let Some(path) = value {
                    if !path.trim().is_empty() {
                        info.insert(key.to_string(), path.clone());
                    }
                }
            }
            if self.passphrase.as_deref().is_some_and(|p| !p.is_empty()) {
                info.insert("passphrase".to_string(), "********".to_string());
            }
        }
        info
    }
}

/// Baseline mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BaselineConfig {
    pub storage_dir: PathBuf,
    pub operation: BaselineOp,
    pub service_name: Option<String>,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub compare_date: Option<String>,
    pub compare_run_id: Option<String>,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            operation: BaselineOp::default(),
            service_name: None,
            description: None,
            tags: Vec::new(),
            compare_date: None,
            compare_run_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_normalise_numbers_to_strings() {
        let config: RunConfig = serde_json::from_str(
            r#"{"tokens": {"id": [1, 2, "three"], "flag": [true]}}"#,
        )
        .unwrap();
        assert_eq!(config.tokens["id"], vec!["1", "2", "three"]);
        assert_eq!(config.tokens["flag"], vec!["true"]);
    }

    #[test]
    fn test_defaults() {
        let config: RunConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.comparison_mode, ComparisonMode::Live);
        assert_eq!(config.test_type, Protocol::Rest);
        assert_eq!(config.max_iterations, 100);
        assert_eq!(config.strategy, Strategy::AllCombinations);
        assert!(!config.ignore_headers);
    }

    #[test]
    fn test_legacy_field_aliases() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "iterationController": "ONE_BY_ONE",
                "api1": {"baseUrl": "http://a"},
                "api2": {"baseUrl": "http://b"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.strategy, Strategy::OneByOne);
        assert_eq!(config.endpoint_a.unwrap().base_url, "http://a");
        assert_eq!(config.endpoint_b.unwrap().base_url, "http://b");
    }

    #[test]
    fn test_auth_summary_masks_passphrase() {
        let auth = Authentication {
            enable_auth: true,
            client_id: Some("client-1".to_string()),
            client_secret: Some("s3cret".to_string()),
            use_mtls: true,
            client_cert_path: Some("certs/client.pem".to_string()),
            passphrase: Some("hunter2".to_string()),
            ..Authentication::default()
        };
        let summary = auth.summary();
        assert_eq!(summary["clientId"], "client-1");
        assert_eq!(summary["passphrase"], "********");
        assert!(!summary.values().any(|v| v.contains("s3cret") || v.contains("hunter2")));
    }
}
