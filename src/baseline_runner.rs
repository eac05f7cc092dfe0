//! Baseline capture and replay.
//!
//! CAPTURE drives endpoint A once per iteration and persists the exact
//! requests and responses as a new run. COMPARE replays a stored run's
//! requests byte for byte against the live endpoint and diffs the fresh
//! responses against the stored ones.

use indexmap::IndexMap;
use std::time::Instant;
use tracing::{error, info};

use crate::baseline::{BaselineIteration, IterationMetadata, ResponseMetadata, RunMetadata};
use crate::config::{Authentication, BaselineConfig, EndpointConfig, OperationConfig, RunConfig};
use crate::diff::{self, DiffOptions};
use crate::errors::{DriftError, Result};
use crate::iteration::{self, Iteration};
use crate::outcome::{BaselineProvenance, CallOutcome, ComparisonResult, Headers, MatchStatus};
use crate::protocol::{BaselineOp, Protocol};
use crate::runner;
use crate::store::BaselineStore;
use crate::transport::{Messaging, TemplateEngine, Transport};

/// Executes the BASELINE side of a run against a single endpoint.
pub struct BaselineRunner<'a> {
    config: &'a RunConfig,
    store: BaselineStore,
    transport: &'a dyn Transport,
    template: &'a dyn TemplateEngine,
    messaging: Option<&'a dyn Messaging>,
}

impl<'a> BaselineRunner<'a> {
    pub fn new(
        config: &'a RunConfig,
        store: BaselineStore,
        transport: &'a dyn Transport,
        template: &'a dyn TemplateEngine,
    ) -> Self {
        Self {
            config,
            store,
            transport,
            template,
            messaging: None,
        }
    }

    pub fn with_messaging(mut self, messaging: Option<&'a dyn Messaging>) -> Self {
        self.messaging = messaging;
        self
    }

    pub fn execute(&self) -> Result<Vec<ComparisonResult>> {
        let baseline = self.baseline_config()?;
        match baseline.operation {
            BaselineOp::Capture => self.capture(),
            BaselineOp::Compare => self.compare(),
        }
    }

    fn baseline_config(&self) -> Result<&BaselineConfig> {
        self.config.baseline.as_ref().ok_or_else(|| {
            DriftError::Config("Baseline configuration is required for BASELINE mode".to_string())
        })
    }

    fn endpoint(&self) -> Result<(&EndpointConfig, &OperationConfig)> {
        let endpoint = self.config.endpoint_a.as_ref().ok_or_else(|| {
            DriftError::Config("Endpoint A configuration is required for baseline mode".to_string())
        })?;
        let operation = endpoint.operations.first().ok_or_else(|| {
            DriftError::Config("Endpoint A must define at least one operation".to_string())
        })?;
        Ok((endpoint, operation))
    }

    // ─── Capture ───────────────────────────────────────────────────────

    pub fn capture(&self) -> Result<Vec<ComparisonResult>> {
        let baseline = self.baseline_config()?;
        let service_name = baseline
            .service_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                DriftError::Config("serviceName is required for baseline capture".to_string())
            })?;
        let (endpoint, operation) = self.endpoint()?;
        let protocol = self.config.test_type;
        let date = BaselineStore::today_date();
        let run_id = self.store.generate_run_id(protocol, service_name, &date);
        info!(service = service_name, %date, run = %run_id, %protocol, "capturing baseline");

        let mut iterations = iteration::generate(
            &self.config.tokens,
            self.config.max_iterations,
            self.config.strategy,
        );
        if !self.config.tokens.is_empty() {
            iterations.insert(0, Iteration::new());
        }
        let used_tokens = runner::identify_used_tokens(self.config);
        let run_dir = self.store.run_dir(Some(protocol), service_name, &date, &run_id);
        let provenance = BaselineProvenance {
            service_name: service_name.to_string(),
            date: date.clone(),
            run_id: run_id.clone(),
            path: run_dir.display().to_string(),
            description: baseline.description.clone(),
            tags: baseline.tags.clone(),
            capture_timestamp: Some(chrono::Local::now().to_rfc3339()),
        };

        let mut results = Vec::new();
        let mut captured = Vec::new();
        for (index, tokens) in iterations.iter().enumerate() {
            let iteration_number = index + 1;
            if index > 0 && runner::should_skip(tokens, &used_tokens) {
                info!(iteration = iteration_number, "skipping iteration, no tokens in use");
                continue;
            }
            match runner::execute_call(
                self.transport,
                self.messaging,
                self.template,
                &runner::CallContext {
                    protocol,
                    base_url: &endpoint.base_url,
                    operation,
                    auth: endpoint.authentication.as_ref(),
                    iteration_number,
                    total_iterations: iterations.len(),
                },
                tokens,
            ) {
                Ok(outcome) => {
                    let mut result = ComparisonResult::new(
                        &operation_label(operation, index == 0),
                        tokens.clone(),
                    );
                    if outcome.is_error_status() {
                        result.mark_error(format!("HTTP Error {}", outcome.status_code));
                    }
                    result.baseline = Some(provenance.clone());
                    // Error responses are captured too; drift into or out of
                    // an error is exactly what replay needs to see.
                    captured.push(self.to_baseline_iteration(
                        &outcome,
                        captured.len() + 1,
                        tokens,
                        operation,
                        endpoint.authentication.as_ref(),
                        &result.timestamp,
                    ));
                    result.outcome_a = Some(outcome);
                    results.push(result);
                }
                Err(e) => {
                    error!(iteration = iteration_number, error = %e, "capture iteration failed");
                    let mut result = ComparisonResult::new(&operation.name, tokens.clone());
                    result.mark_error(format!("Capture failed: {e}"));
                    results.push(result);
                }
            }
        }

        let metadata = self.build_run_metadata(
            &run_id,
            service_name,
            &date,
            endpoint,
            operation,
            baseline,
            captured.len(),
            &run_dir,
        );
        self.store.save_baseline(&metadata, &captured)?;
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_run_metadata(
        &self,
        run_id: &str,
        service_name: &str,
        date: &str,
        endpoint: &EndpointConfig,
        operation: &OperationConfig,
        baseline: &BaselineConfig,
        total_iterations: usize,
        run_dir: &std::path::Path,
    ) -> RunMetadata {
        let mut config_used: IndexMap<String, serde_json::Value> = IndexMap::new();
        config_used.insert(
            "maxIterations".to_string(),
            serde_json::json!(self.config.max_iterations),
        );
        config_used.insert(
            "iterationController".to_string(),
            serde_json::to_value(self.config.strategy).unwrap_or_default(),
        );
        config_used.insert(
            "testType".to_string(),
            serde_json::to_value(self.config.test_type).unwrap_or_default(),
        );
        if let Some(auth) = &endpoint.authentication {
            // Certificates move with the baseline so replay works after the
            // originals rotate or disappear.
            let mut stored = auth.clone();
            let copy = |path: &Option<String>| {
                path.as_deref()
                    .map(|p| self.store.copy_referenced_file(run_dir, p))
            };
            stored.pfx_path = copy(&auth.pfx_path);
            stored.client_cert_path = copy(&auth.client_cert_path);
            stored.client_key_path = copy(&auth.client_key_path);
            stored.ca_cert_path = copy(&auth.ca_cert_path);
            config_used.insert(
                "authentication".to_string(),
                serde_json::to_value(&stored).unwrap_or_default(),
            );
        }
        RunMetadata {
            run_id: run_id.to_string(),
            service_name: service_name.to_string(),
            capture_date: date.to_string(),
            capture_timestamp: chrono::Local::now().to_rfc3339(),
            test_type: self.config.test_type,
            base_url: endpoint.base_url.clone(),
            operation: operation.name.clone(),
            total_iterations,
            description: baseline.description.clone(),
            tags: baseline.tags.clone(),
            config_used,
        }
    }

    fn to_baseline_iteration(
        &self,
        outcome: &CallOutcome,
        iteration_number: usize,
        tokens: &Iteration,
        operation: &OperationConfig,
        auth: Option<&Authentication>,
        timestamp: &str,
    ) -> BaselineIteration {
        let request_metadata = IterationMetadata {
            iteration_number,
            timestamp: timestamp.to_string(),
            tokens_used: tokens.clone(),
            endpoint: outcome.url.clone(),
            method: outcome.method.clone(),
            soap_action: operation.soap_action.clone(),
            authentication: auth.map(Authentication::summary).unwrap_or_default(),
            request_size: outcome.request_payload.as_ref().map(|p| p.len()),
        };
        let response_metadata = ResponseMetadata {
            status_code: outcome.status_code,
            duration: outcome.duration_ms,
            timestamp: timestamp.to_string(),
            content_type: outcome
                .response_headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-type"))
                .map(|(_, value)| value.clone()),
            extra: IndexMap::new(),
        };
        BaselineIteration {
            iteration_number,
            request_payload: outcome.request_payload.clone(),
            request_headers: outcome.request_headers.clone(),
            request_metadata,
            response_payload: outcome.response_payload.clone(),
            response_headers: outcome.response_headers.clone(),
            response_metadata,
        }
    }

    // ─── Compare ───────────────────────────────────────────────────────

    pub fn compare(&self) -> Result<Vec<ComparisonResult>> {
        let baseline = self.baseline_config()?;
        let (service_name, date, run_id) = match (
            baseline.service_name.as_deref(),
            baseline.compare_date.as_deref(),
            baseline.compare_run_id.as_deref(),
        ) {
            (Some(s), Some(d), Some(r)) => (s, d, r),
            _ => {
                return Err(DriftError::Config(
                    "serviceName, compareDate, and compareRunId are required for baseline compare"
                        .to_string(),
                ))
            }
        };
        let (endpoint, operation) = self.endpoint()?;
        info!(service = service_name, date, run = run_id, "comparing with baseline");
        let stored = self.store.load_baseline(service_name, date, run_id)?;
        let protocol = self.store.detect_protocol(service_name, date, Some(run_id));
        let run_dir = self.store.run_dir(protocol, service_name, date, run_id);
        let provenance = BaselineProvenance {
            service_name: service_name.to_string(),
            date: date.to_string(),
            run_id: run_id.to_string(),
            path: run_dir.display().to_string(),
            description: stored.metadata.description.clone(),
            tags: stored.metadata.tags.clone(),
            capture_timestamp: Some(stored.metadata.capture_timestamp.clone()),
        };
        let options = DiffOptions {
            ignored_fields: self.config.ignored_fields.clone(),
            ignore_headers: self.config.ignore_headers,
            compare_error_responses: self.config.compare_error_responses,
        };

        let mut results = Vec::new();
        for iteration in &stored.iterations {
            let tokens = iteration.request_metadata.tokens_used.clone();
            let label = operation_label(operation, iteration.iteration_number == 1);
            match self.replay_call(endpoint, operation, iteration, &tokens) {
                Ok(fresh) => {
                    let mut result = ComparisonResult::new(&label, tokens);
                    result.baseline = Some(provenance.clone());
                    result.outcome_a = Some(fresh);
                    result.outcome_b = Some(stored_outcome(iteration));
                    diff::compare(&mut result, self.config.test_type, &options);
                    results.push(result);
                }
                Err(e) => {
                    error!(
                        iteration = iteration.iteration_number,
                        error = %e,
                        "compare iteration failed"
                    );
                    let mut result = ComparisonResult::new(&operation.name, tokens);
                    result.mark_error(format!("Comparison failed: {e}"));
                    results.push(result);
                }
            }
        }
        info!(iterations = results.len(), "baseline comparison completed");
        Ok(results)
    }

    /// Replay one stored iteration: the saved payload and headers are sent
    /// verbatim, only the URL is rebuilt from the current endpoint config.
    fn replay_call(
        &self,
        endpoint: &EndpointConfig,
        operation: &OperationConfig,
        stored: &BaselineIteration,
        tokens: &Iteration,
    ) -> Result<CallOutcome> {
        let payload = stored.request_payload.clone();
        let headers = stored.request_headers.clone();
        if self.config.test_type == Protocol::Jms {
            return self.replay_jms(operation, headers, payload);
        }
        let url = runner::construct_url(&endpoint.base_url, operation, tokens, self.config.test_type);
        let started = Instant::now();
        let response =
            self.transport
                .send_request(&url, &operation.method, &headers, payload.as_deref())?;
        Ok(CallOutcome::new(&url, &operation.method)
            .with_status(response.status_code)
            .with_request(response.request_headers, payload)
            .with_response(response.headers, response.body)
            .with_duration(started.elapsed().as_millis() as u64))
    }

    fn replay_jms(
        &self,
        operation: &OperationConfig,
        headers: Headers,
        payload: Option<String>,
    ) -> Result<CallOutcome> {
        let messaging = self.messaging.ok_or_else(|| {
            DriftError::Messaging("JMS replay configured without a messaging provider".to_string())
        })?;
        let destination = operation.destination.as_deref().ok_or_else(|| {
            DriftError::Messaging(format!("operation {} has no destination", operation.name))
        })?;
        let payload = payload.unwrap_or_default();
        let started = Instant::now();
        messaging.send_message(destination, operation.destination_type, &payload, &headers)?;
        let reply = messaging.receive_once(
            destination,
            operation.destination_type,
            std::time::Duration::from_secs(30),
        )?;
        let outcome =
            CallOutcome::new(&format!("jms:{destination}"), "SEND").with_request(headers, Some(payload));
        Ok(match reply {
            Some(message) => outcome
                .with_status(200)
                .with_response(message.headers, Some(message.payload))
                .with_duration(started.elapsed().as_millis() as u64),
            None => outcome
                .with_status(408)
                .with_duration(started.elapsed().as_millis() as u64),
        })
    }

    // ─── Presentation ──────────────────────────────────────────────────

    /// Render a stored run as result records, one MATCH entry per iteration
    /// with no live counterpart. Used to browse history.
    pub fn baseline_as_results(
        &self,
        service_name: &str,
        date: &str,
        run_id: &str,
    ) -> Result<Vec<ComparisonResult>> {
        let stored = self.store.load_baseline(service_name, date, run_id)?;
        let protocol = self.store.detect_protocol(service_name, date, Some(run_id));
        let run_dir = self.store.run_dir(protocol, service_name, date, run_id);
        let label = format!("{} (Baseline)", stored.metadata.operation);
        let mut results = Vec::new();
        for iteration in &stored.iterations {
            let mut result = ComparisonResult::new(&label, iteration.request_metadata.tokens_used.clone());
            result.timestamp = iteration.request_metadata.timestamp.clone();
            result.status = MatchStatus::Match;
            result.baseline = Some(BaselineProvenance {
                service_name: service_name.to_string(),
                date: date.to_string(),
                run_id: run_id.to_string(),
                path: run_dir.display().to_string(),
                description: stored.metadata.description.clone(),
                tags: stored.metadata.tags.clone(),
                capture_timestamp: Some(stored.metadata.capture_timestamp.clone()),
            });
            result.outcome_a = Some(stored_outcome(iteration));
            results.push(result);
        }
        Ok(results)
    }
}

/// Authentication context a COMPARE replay should run under: the one saved
/// with the baseline, with run-relative certificate paths resolved. Falls
/// back to `None` when the capture recorded no credentials.
pub fn replay_authentication(
    store: &BaselineStore,
    service_name: &str,
    date: &str,
    run_id: &str,
) -> Result<Option<Authentication>> {
    let metadata = store.run_metadata(service_name, date, run_id)?;
    let Some(raw) = metadata.config_used.get("authentication") else {
        return Ok(None);
    };
    let mut auth: Authentication = serde_json::from_value(raw.clone())
        .map_err(|e| DriftError::Config(format!("invalid saved authentication: {e}")))?;
    let protocol = store.detect_protocol(service_name, date, Some(run_id));
    let resolve = |path: &Option<String>| {
        path.as_deref()
            .map(|p| store.resolve_cert_path(protocol, service_name, date, run_id, p))
    };
    auth.pfx_path = resolve(&auth.pfx_path);
    auth.client_cert_path = resolve(&auth.client_cert_path);
    auth.client_key_path = resolve(&auth.client_key_path);
    auth.ca_cert_path = resolve(&auth.ca_cert_path);
    Ok(Some(auth))
}

pub(crate) fn operation_label(operation: &OperationConfig, is_original: bool) -> String {
    if is_original {
        format!("{} (Original Input Payload)", operation.name)
    } else {
        operation.name.clone()
    }
}

/// Synthetic outcome representing the stored side of a comparison.
fn stored_outcome(iteration: &BaselineIteration) -> CallOutcome {
    CallOutcome::new(
        &iteration.request_metadata.endpoint,
        &iteration.request_metadata.method,
    )
    .with_status(iteration.response_metadata.status_code)
    .with_request(
        iteration.request_headers.clone(),
        iteration.request_payload.clone(),
    )
    .with_response(
        iteration.response_headers.clone(),
        iteration.response_payload.clone(),
    )
    .with_duration(iteration.response_metadata.duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ComparisonMode;
    use crate::transport::{TokenTemplate, TransportResponse};
    use std::cell::RefCell;
    use tempfile::TempDir;

    struct CannedTransport {
        responses: Vec<(u16, String)>,
        calls: RefCell<usize>,
        payloads: RefCell<Vec<Option<String>>>,
    }

    impl CannedTransport {
        fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: responses
                    .into_iter()
                    .map(|(s, b)| (s, b.to_string()))
                    .collect(),
                calls: RefCell::new(0),
                payloads: RefCell::new(Vec::new()),
            }
        }
    }

    impl Transport for CannedTransport {
        fn send_request(
            &self,
            _url: &str,
            _method: &str,
            headers: &Headers,
            payload: Option<&str>,
        ) -> Result<TransportResponse> {
            let mut calls = self.calls.borrow_mut();
            self.payloads
                .borrow_mut()
                .push(payload.map(|p| p.to_string()));
            let (status, body) = self.responses[(*calls).min(self.responses.len() - 1)].clone();
            *calls += 1;
            Ok(TransportResponse {
                status_code: status,
                headers: Headers::new(),
                body: Some(body),
                request_headers: headers.clone(),
            })
        }
    }

    fn capture_config(storage_dir: &std::path::Path) -> RunConfig {
        RunConfig {
            comparison_mode: ComparisonMode::Baseline,
            endpoint_a: Some(EndpointConfig {
                base_url: "http://svc".to_string(),
                operations: vec![OperationConfig {
                    name: "getOrder".to_string(),
                    method: "POST".to_string(),
                    path: Some("/orders".to_string()),
                    payload_template: Some(r#"{"id": "{{id}}"}"#.to_string()),
                    ..OperationConfig::default()
                }],
                ..EndpointConfig::default()
            }),
            baseline: Some(BaselineConfig {
                storage_dir: storage_dir.to_path_buf(),
                service_name: Some("orders".to_string()),
                description: Some("nightly".to_string()),
                ..BaselineConfig::default()
            }),
            ..RunConfig::default()
        }
    }

    fn capture_run(config: &RunConfig, transport: &CannedTransport) -> Vec<ComparisonResult> {
        let store = BaselineStore::new(config.baseline.as_ref().unwrap().storage_dir.clone());
        BaselineRunner::new(config, store, transport, &TokenTemplate)
            .capture()
            .unwrap()
    }

    #[test]
    fn test_capture_persists_run_and_reports_match() {
        let dir = TempDir::new().unwrap();
        let config = capture_config(dir.path());
        let transport = CannedTransport::new(vec![(200, r#"{"ok":true}"#)]);
        let results = capture_run(&config, &transport);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, MatchStatus::Match);
        let provenance = results[0].baseline.as_ref().unwrap();
        assert_eq!(provenance.run_id, "run-001");

        let store = BaselineStore::new(dir.path());
        let date = BaselineStore::today_date();
        let run = store.load_baseline("orders", &date, "run-001").unwrap();
        assert_eq!(run.metadata.operation, "getOrder");
        assert_eq!(run.iterations.len(), 1);
        assert_eq!(run.iterations[0].response_payload.as_deref(), Some(r#"{"ok":true}"#));
    }

    #[test]
    fn test_capture_marks_http_error_but_still_persists() {
        let dir = TempDir::new().unwrap();
        let config = capture_config(dir.path());
        let transport = CannedTransport::new(vec![(500, "boom")]);
        let results = capture_run(&config, &transport);

        assert_eq!(results[0].status, MatchStatus::Error);
        assert_eq!(results[0].error_message.as_deref(), Some("HTTP Error 500"));

        let store = BaselineStore::new(dir.path());
        let run = store
            .load_baseline("orders", &BaselineStore::today_date(), "run-001")
            .unwrap();
        assert_eq!(run.iterations[0].response_metadata.status_code, 500);
    }

    #[test]
    fn test_capture_requires_service_name() {
        let dir = TempDir::new().unwrap();
        let mut config = capture_config(dir.path());
        config.baseline.as_mut().unwrap().service_name = None;
        let transport = CannedTransport::new(vec![(200, "{}")]);
        let store = BaselineStore::new(dir.path());
        let err = BaselineRunner::new(&config, store, &transport, &TokenTemplate)
            .capture()
            .unwrap_err();
        assert!(matches!(err, DriftError::Config(_)));
    }

    #[test]
    fn test_capture_prepends_control_iteration_for_tokenised_runs() {
        let dir = TempDir::new().unwrap();
        let mut config = capture_config(dir.path());
        config
            .tokens
            .insert("id".to_string(), vec!["1".to_string(), "2".to_string()]);
        let transport = CannedTransport::new(vec![(200, "{}")]);
        let results = capture_run(&config, &transport);

        assert_eq!(results.len(), 3);
        assert!(results[0].operation_name.ends_with("(Original Input Payload)"));
        assert!(results[0].iteration_tokens.is_empty());
        // The control iteration sends the raw template.
        assert_eq!(
            transport.payloads.borrow()[0].as_deref(),
            Some(r#"{"id": "{{id}}"}"#)
        );
    }

    fn seeded_baseline(dir: &TempDir, response: &str) -> (RunConfig, String) {
        let config = capture_config(dir.path());
        let transport = CannedTransport::new(vec![(200, response)]);
        capture_run(&config, &transport);
        let date = BaselineStore::today_date();
        let mut compare = config;
        {
            let baseline = compare.baseline.as_mut().unwrap();
            baseline.operation = BaselineOp::Compare;
            baseline.compare_date = Some(date.clone());
            baseline.compare_run_id = Some("run-001".to_string());
        }
        (compare, date)
    }

    #[test]
    fn test_compare_matches_unchanged_endpoint() {
        let dir = TempDir::new().unwrap();
        let (config, _date) = seeded_baseline(&dir, r#"{"total": 10}"#);
        let transport = CannedTransport::new(vec![(200, r#"{"total": 10}"#)]);
        let store = BaselineStore::new(dir.path());
        let results = BaselineRunner::new(&config, store, &transport, &TokenTemplate)
            .compare()
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].status, MatchStatus::Match);
        assert!(results[0].baseline.is_some());
    }

    #[test]
    fn test_compare_detects_drift() {
        let dir = TempDir::new().unwrap();
        let (config, _date) = seeded_baseline(&dir, r#"{"total": 10}"#);
        let transport = CannedTransport::new(vec![(200, r#"{"total": 99}"#)]);
        let store = BaselineStore::new(dir.path());
        let results = BaselineRunner::new(&config, store, &transport, &TokenTemplate)
            .compare()
            .unwrap();
        assert_eq!(results[0].status, MatchStatus::Mismatch);
        assert!(results[0].differences.iter().any(|d| d.contains("total")));
    }

    #[test]
    fn test_compare_replays_stored_payload_verbatim() {
        let dir = TempDir::new().unwrap();
        let (mut config, _date) = seeded_baseline(&dir, "{}");
        // A changed template must not leak into the replay.
        config.endpoint_a.as_mut().unwrap().operations[0].payload_template =
            Some(r#"{"id": "CHANGED"}"#.to_string());
        let transport = CannedTransport::new(vec![(200, "{}")]);
        let store = BaselineStore::new(dir.path());
        BaselineRunner::new(&config, store, &transport, &TokenTemplate)
            .compare()
            .unwrap();
        assert_eq!(
            transport.payloads.borrow()[0].as_deref(),
            Some(r#"{"id": "{{id}}"}"#)
        );
    }

    #[test]
    fn test_compare_requires_coordinates() {
        let dir = TempDir::new().unwrap();
        let mut config = capture_config(dir.path());
        config.baseline.as_mut().unwrap().operation = BaselineOp::Compare;
        let transport = CannedTransport::new(vec![(200, "{}")]);
        let store = BaselineStore::new(dir.path());
        let err = BaselineRunner::new(&config, store, &transport, &TokenTemplate)
            .compare()
            .unwrap_err();
        assert!(matches!(err, DriftError::Config(_)));
    }

    #[test]
    fn test_baseline_as_results_presents_stored_run() {
        let dir = TempDir::new().unwrap();
        let (config, date) = seeded_baseline(&dir, r#"{"ok":true}"#);
        let transport = CannedTransport::new(vec![(200, "{}")]);
        let store = BaselineStore::new(dir.path());
        let runner = BaselineRunner::new(&config, store, &transport, &TokenTemplate);
        let results = runner.baseline_as_results("orders", &date, "run-001").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].operation_name, "getOrder (Baseline)");
        assert_eq!(results[0].status, MatchStatus::Match);
        assert!(results[0].outcome_b.is_none());
        assert_eq!(
            results[0].outcome_a.as_ref().unwrap().response_payload.as_deref(),
            Some(r#"{"ok":true}"#)
        );
    }

    #[test]
    fn test_replay_authentication_resolves_saved_paths() {
        let dir = TempDir::new().unwrap();
        let cert = dir.path().join("client.pem");
        std::fs::write(&cert, "---CERT---").unwrap();
        let mut config = capture_config(dir.path());
        config.endpoint_a.as_mut().unwrap().authentication = Some(Authentication {
            use_mtls: true,
            client_cert_path: Some(cert.to_string_lossy().to_string()),
            ..Authentication::default()
        });
        let transport = CannedTransport::new(vec![(200, "{}")]);
        capture_run(&config, &transport);

        let store = BaselineStore::new(dir.path());
        let date = BaselineStore::today_date();
        let auth = replay_authentication(&store, "orders", &date, "run-001")
            .unwrap()
            .unwrap();
        let resolved = auth.client_cert_path.unwrap();
        assert!(resolved.ends_with("certs/client.pem"));
        assert!(std::path::Path::new(&resolved).exists());
    }
}
