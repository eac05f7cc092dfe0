//! Closed enumerations shared across the crate: protocol family, iteration
//! strategy, comparison mode, and baseline sub-operation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol family of a comparison run.
///
/// Determines URL construction, the storage subdirectory of a captured run,
/// and the file extension chosen for payload files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    #[default]
    Rest,
    Soap,
    Jms,
}

impl Protocol {
    /// Fixed probe order for protocol auto-detection on disk.
    pub const DETECT_ORDER: [Protocol; 3] = [Protocol::Rest, Protocol::Jms, Protocol::Soap];

    /// Storage directory name for this protocol.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Rest => "rest",
            Self::Soap => "soap",
            Self::Jms => "jms",
        }
    }

    /// Reverse of [`dir_name`](Self::dir_name).
    pub fn from_dir_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "rest" => Some(Self::Rest),
            "soap" => Some(Self::Soap),
            "jms" => Some(Self::Jms),
            _ => None,
        }
    }

    /// Map a free-form test type string onto a protocol, defaulting to REST.
    /// Legacy configs carry values like `"SOAP_API"`, hence the contains check.
    pub fn from_test_type(test_type: &str) -> Self {
        let upper = test_type.to_uppercase();
        if upper.contains("JMS") {
            Self::Jms
        } else if upper.contains("SOAP") {
            Self::Soap
        } else {
            Self::Rest
        }
    }

    /// True if `name` is one of the three protocol storage directories.
    pub fn is_protocol_dir(name: &str) -> bool {
        Self::from_dir_name(name).is_some()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Iteration generation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// Full cross-product of all token value lists.
    #[default]
    AllCombinations,
    /// Defaults iteration first, then one iteration per non-default value.
    OneByOne,
}

/// Top-level mode of a comparison run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ComparisonMode {
    /// Drive two endpoints with the same inputs and diff the responses.
    #[default]
    Live,
    /// Capture or replay an on-disk baseline against a single endpoint.
    Baseline,
}

/// Sub-operation selected when the comparison mode is BASELINE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum BaselineOp {
    /// Record a new run.
    #[default]
    Capture,
    /// Replay an existing run's requests and diff against its responses.
    Compare,
}

/// Messaging destination kind for JMS-style transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DestinationType {
    #[default]
    Queue,
    Topic,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_test_type_defaults_to_rest() {
        assert_eq!(Protocol::from_test_type("REST"), Protocol::Rest);
        assert_eq!(Protocol::from_test_type("anything"), Protocol::Rest);
    }

    #[test]
    fn test_from_test_type_contains_match() {
        assert_eq!(Protocol::from_test_type("SOAP_API"), Protocol::Soap);
        assert_eq!(Protocol::from_test_type("jms-queue"), Protocol::Jms);
    }

    #[test]
    fn test_detect_order_is_rest_jms_soap() {
        let names: Vec<&str> = Protocol::DETECT_ORDER.iter().map(|p| p.dir_name()).collect();
        assert_eq!(names, vec!["rest", "jms", "soap"]);
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(
            serde_json::to_string(&Strategy::AllCombinations).unwrap(),
            "\"ALL_COMBINATIONS\""
        );
        let s: Strategy = serde_json::from_str("\"ONE_BY_ONE\"").unwrap();
        assert_eq!(s, Strategy::OneByOne);
    }
}
