//! Tolerant structural diff over two captured call outcomes.
//!
//! REST bodies are compared structurally as JSON (key order insensitive,
//! ignored fields stripped recursively); SOAP and JMS bodies are compared as
//! whitespace-normalised text. Classification lands in the passed-in result;
//! the engine performs no I/O.

use serde_json::Value;

use crate::outcome::{ComparisonResult, Headers, MatchStatus};
use crate::protocol::Protocol;

/// Transport-level headers that are never meaningful to compare.
const ALWAYS_IGNORED_HEADERS: [&str; 11] = [
    "Date",
    "Server",
    "Transfer-Encoding",
    "Keep-Alive",
    "Connection",
    "ETag",
    "Last-Modified",
    "X-Request-ID",
    "Strict-Transport-Security",
    "Content-Length",
    "Vary",
];

/// Caller-supplied diff policy.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Structural field names excluded from the diff regardless of value.
    pub ignored_fields: Vec<String>,
    /// Skip header comparison entirely.
    pub ignore_headers: bool,
    /// Diff error responses instead of classifying them as ERROR outright.
    pub compare_error_responses: bool,
}

/// Compare `result.outcome_a` against `result.outcome_b`, setting the
/// result's status, error message, and difference list.
pub fn compare(result: &mut ComparisonResult, protocol: Protocol, options: &DiffOptions) {
    let (Some(a), Some(b)) = (result.outcome_a.clone(), result.outcome_b.clone()) else {
        result.mark_error("One or both API calls failed, cannot compare.".to_string());
        return;
    };

    if !options.compare_error_responses && (a.is_error_status() || b.is_error_status()) {
        let message = if a.is_error_status() && b.is_error_status() {
            format!(
                "HTTP ERROR DETECTED: Both endpoints failed - A: {}, B: {}",
                a.status_code, b.status_code
            )
        } else if a.is_error_status() {
            format!("HTTP ERROR DETECTED: A failed with HTTP {}", a.status_code)
        } else {
            format!("HTTP ERROR DETECTED: B failed with HTTP {}", b.status_code)
        };
        result.differences = vec![message.clone()];
        result.mark_error(message);
        return;
    }

    let mut differences = Vec::new();

    if !options.ignore_headers {
        compare_headers(
            &a.response_headers,
            &b.response_headers,
            &options.ignored_fields,
            &mut differences,
        );
    }

    match (&a.response_payload, &b.response_payload) {
        (None, None) => {}
        (Some(_), None) | (None, Some(_)) => {
            differences.push("One response body is null while the other is present.".to_string());
        }
        (Some(body_a), Some(body_b)) => match protocol {
            Protocol::Rest => compare_json_bodies(body_a, body_b, options, &mut differences),
            Protocol::Soap | Protocol::Jms => {
                if normalize_text(body_a) != normalize_text(body_b) {
                    differences.push("Normalized payload text differs.".to_string());
                }
            }
        },
    }

    if differences.is_empty() {
        result.status = MatchStatus::Match;
    } else {
        result.status = MatchStatus::Mismatch;
        result.differences = differences;
    }
}

fn is_always_ignored(header: &str) -> bool {
    ALWAYS_IGNORED_HEADERS
        .iter()
        .any(|ignored| ignored.eq_ignore_ascii_case(header))
}

fn compare_headers(
    headers_a: &Headers,
    headers_b: &Headers,
    ignored_fields: &[String],
    differences: &mut Vec<String>,
) {
    let mut keys: Vec<&String> = headers_a.keys().collect();
    for key in headers_b.keys() {
        if !headers_a.contains_key(key) {
            keys.push(key);
        }
    }
    for key in keys {
        if is_always_ignored(key) || ignored_fields.iter().any(|f| f == key) {
            continue;
        }
        let value_a = headers_a.get(key);
        let value_b = headers_b.get(key);
        if value_a != value_b {
            differences.push(format!(
                "Header mismatch [{key}]: A='{}' vs B='{}'",
                value_a.map(String::as_str).unwrap_or("<absent>"),
                value_b.map(String::as_str).unwrap_or("<absent>"),
            ));
        }
    }
}

fn compare_json_bodies(
    body_a: &str,
    body_b: &str,
    options: &DiffOptions,
    differences: &mut Vec<String>,
) {
    match (
        serde_json::from_str::<Value>(body_a),
        serde_json::from_str::<Value>(body_b),
    ) {
        (Ok(mut json_a), Ok(mut json_b)) => {
            if !options.ignored_fields.is_empty() {
                strip_ignored_fields(&mut json_a, &options.ignored_fields);
                strip_ignored_fields(&mut json_b, &options.ignored_fields);
            }
            if json_a != json_b {
                json_diff(&json_a, &json_b, "$", differences);
            }
        }
        _ => {
            // Unparseable on either side: fall back to literal comparison.
            if body_a.trim() != body_b.trim() {
                differences.push("JSON parsing failed and strings differ.".to_string());
            }
        }
    }
}

fn strip_ignored_fields(node: &mut Value, ignored: &[String]) {
    match node {
        Value::Object(map) => {
            map.retain(|key, _| !ignored.iter().any(|f| f == key));
            for child in map.values_mut() {
                strip_ignored_fields(child, ignored);
            }
        }
        Value::Array(items) => {
            for child in items {
                strip_ignored_fields(child, ignored);
            }
        }
        _ => {}
    }
}

/// Recursive path-annotated JSON diff, e.g. `$.data.items[2].id`.
fn json_diff(a: &Value, b: &Value, path: &str, differences: &mut Vec<String>) {
    match (a, b) {
        (Value::Object(obj_a), Value::Object(obj_b)) => {
            for (key, value_a) in obj_a {
                let child_path = format!("{path}.{key}");
                match obj_b.get(key) {
                    Some(value_b) => json_diff(value_a, value_b, &child_path, differences),
                    None => differences.push(format!("Missing field in B: {child_path}")),
                }
            }
            for key in obj_b.keys() {
                if !obj_a.contains_key(key) {
                    differences.push(format!("Missing field in A: {path}.{key}"));
                }
            }
        }
        (Value::Array(arr_a), Value::Array(arr_b)) => {
            let longest = arr_a.len().max(arr_b.len());
            for i in 0..longest {
                let child_path = format!("{path}[{i}]");
                match (arr_a.get(i), arr_b.get(i)) {
                    (Some(value_a), Some(value_b)) => {
                        json_diff(value_a, value_b, &child_path, differences)
                    }
                    (Some(_), None) => {
                        differences.push(format!("Missing element in B: {child_path}"))
                    }
                    (None, Some(_)) => {
                        differences.push(format!("Missing element in A: {child_path}"))
                    }
                    (None, None) => {}
                }
            }
        }
        _ => {
            if a != b {
                differences.push(format!("Values differ at {path}. A: {a}, B: {b}"));
            }
        }
    }
}

/// Collapse whitespace runs and the gaps between XML tags.
fn normalize_text(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.replace("> <", "><")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::CallOutcome;

    fn result_with_bodies(body_a: &str, body_b: &str) -> ComparisonResult {
        let mut result = ComparisonResult::new("op", Default::default());
        result.outcome_a = Some(
            CallOutcome::new("http://a", "GET")
                .with_status(200)
                .with_response(Headers::new(), Some(body_a.to_string())),
        );
        result.outcome_b = Some(
            CallOutcome::new("http://b", "GET")
                .with_status(200)
                .with_response(Headers::new(), Some(body_b.to_string())),
        );
        result
    }

    #[test]
    fn test_rest_match_ignores_key_order() {
        let mut result = result_with_bodies(
            r#"{"status":"success","id":1}"#,
            r#"{"id":1,"status":"success"}"#,
        );
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Match);
        assert!(result.differences.is_empty());
    }

    #[test]
    fn test_rest_mismatch_reports_path() {
        let mut result = result_with_bodies(
            r#"{"status":"success","id":1}"#,
            r#"{"status":"success","id":2}"#,
        );
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Mismatch);
        assert!(result.differences.iter().any(|d| d.contains("$.id")));
    }

    #[test]
    fn test_rest_structure_mismatch() {
        let mut result = result_with_bodies(
            r#"{"status":"success"}"#,
            r#"{"status":"success","extra":"field"}"#,
        );
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Mismatch);
        assert!(result.differences.iter().any(|d| d.contains("Missing field in A")));
    }

    #[test]
    fn test_rest_ignored_fields() {
        let mut result = result_with_bodies(
            r#"{"status":"success","timestamp":100}"#,
            r#"{"status":"success","timestamp":200}"#,
        );
        let options = DiffOptions {
            ignored_fields: vec!["timestamp".to_string()],
            ..DiffOptions::default()
        };
        compare(&mut result, Protocol::Rest, &options);
        assert_eq!(result.status, MatchStatus::Match);
    }

    #[test]
    fn test_rest_unparseable_falls_back_to_string_compare() {
        let mut result = result_with_bodies("not json", "not json ");
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Match);

        let mut result = result_with_bodies("not json", "also not json");
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Mismatch);
    }

    #[test]
    fn test_soap_whitespace_insensitive() {
        let mut result = result_with_bodies(
            "<root>  <status>ok</status>  </root>",
            "<root><status>ok</status></root>",
        );
        compare(&mut result, Protocol::Soap, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Match);
    }

    #[test]
    fn test_soap_mismatch() {
        let mut result = result_with_bodies(
            "<root><status>ok</status></root>",
            "<root><status>failed</status></root>",
        );
        compare(&mut result, Protocol::Soap, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Mismatch);
    }

    #[test]
    fn test_error_status_short_circuits() {
        let mut result = result_with_bodies("{}", "{}");
        result.outcome_b.as_mut().unwrap().status_code = 500;
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Error);
        assert!(result
            .error_message
            .as_deref()
            .unwrap()
            .contains("B failed with HTTP 500"));
    }

    #[test]
    fn test_error_status_compared_when_opted_in() {
        let mut result = result_with_bodies(r#"{"error":"x"}"#, r#"{"error":"x"}"#);
        result.outcome_a.as_mut().unwrap().status_code = 500;
        result.outcome_b.as_mut().unwrap().status_code = 500;
        let options = DiffOptions {
            compare_error_responses: true,
            ..DiffOptions::default()
        };
        compare(&mut result, Protocol::Rest, &options);
        assert_eq!(result.status, MatchStatus::Match);
    }

    #[test]
    fn test_missing_outcome_is_error() {
        let mut result = ComparisonResult::new("op", Default::default());
        result.outcome_a = Some(CallOutcome::new("http://a", "GET"));
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Error);
    }

    #[test]
    fn test_transport_headers_always_ignored() {
        let mut result = result_with_bodies("{}", "{}");
        let a = result.outcome_a.as_mut().unwrap();
        a.response_headers
            .insert("Date".to_string(), "Mon".to_string());
        let b = result.outcome_b.as_mut().unwrap();
        b.response_headers
            .insert("Date".to_string(), "Tue".to_string());
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Match);
    }

    #[test]
    fn test_header_mismatch_detected() {
        let mut result = result_with_bodies("{}", "{}");
        result
            .outcome_a
            .as_mut()
            .unwrap()
            .response_headers
            .insert("X-Api-Version".to_string(), "1".to_string());
        result
            .outcome_b
            .as_mut()
            .unwrap()
            .response_headers
            .insert("X-Api-Version".to_string(), "2".to_string());
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Mismatch);
        assert!(result.differences[0].contains("X-Api-Version"));
    }

    #[test]
    fn test_headers_skipped_entirely_when_requested() {
        let mut result = result_with_bodies("{}", "{}");
        result
            .outcome_a
            .as_mut()
            .unwrap()
            .response_headers
            .insert("X-Api-Version".to_string(), "1".to_string());
        let options = DiffOptions {
            ignore_headers: true,
            ..DiffOptions::default()
        };
        compare(&mut result, Protocol::Rest, &options);
        assert_eq!(result.status, MatchStatus::Match);
    }

    #[test]
    fn test_null_body_on_one_side() {
        let mut result = result_with_bodies("{}", "{}");
        result.outcome_b.as_mut().unwrap().response_payload = None;
        compare(&mut result, Protocol::Rest, &DiffOptions::default());
        assert_eq!(result.status, MatchStatus::Mismatch);
    }
}
