//! Comparison orchestrator.
//!
//! LIVE mode drives endpoint A and endpoint B with identical inputs, one
//! iteration at a time, and hands each pair of outcomes to the diff engine.
//! BASELINE mode is delegated to [`BaselineRunner`]; a baseline failure
//! collapses into a single ERROR result rather than aborting the process.

use std::collections::HashSet;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::baseline_runner::{operation_label, BaselineRunner};
use crate::config::{Authentication, OperationConfig, RunConfig};
use crate::diff::{self, DiffOptions};
use crate::errors::{DriftError, Result};
use crate::iteration::{self, Iteration};
use crate::outcome::{CallMetadata, CallOutcome, ComparisonResult, Headers};
use crate::protocol::{ComparisonMode, Protocol};
use crate::store::BaselineStore;
use crate::transport::{Messaging, TemplateEngine, Transport};

/// How long a JMS call waits for a reply before being recorded as timed out.
const JMS_REPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Synthetic status for a messaging call that produced no reply in time.
const JMS_TIMEOUT_STATUS: u16 = 408;

/// Everything one call needs beyond the transport itself.
pub(crate) struct CallContext<'a> {
    pub protocol: Protocol,
    pub base_url: &'a str,
    pub operation: &'a OperationConfig,
    pub auth: Option<&'a Authentication>,
    pub iteration_number: usize,
    pub total_iterations: usize,
}

/// Orchestrates one run end to end. All transport work goes through the
/// injected collaborators, never directly through a client library.
pub struct ComparisonRunner {
    config: RunConfig,
    transport_a: Box<dyn Transport>,
    transport_b: Box<dyn Transport>,
    template: Box<dyn TemplateEngine>,
    messaging_a: Option<Box<dyn Messaging>>,
    messaging_b: Option<Box<dyn Messaging>>,
}

impl ComparisonRunner {
    pub fn new(
        config: RunConfig,
        transport_a: Box<dyn Transport>,
        transport_b: Box<dyn Transport>,
        template: Box<dyn TemplateEngine>,
    ) -> Self {
        Self {
            config,
            transport_a,
            transport_b,
            template,
            messaging_a: None,
            messaging_b: None,
        }
    }

    pub fn with_messaging(
        mut self,
        messaging_a: Box<dyn Messaging>,
        messaging_b: Box<dyn Messaging>,
    ) -> Self {
        self.messaging_a = Some(messaging_a);
        self.messaging_b = Some(messaging_b);
        self
    }

    /// Run the configured comparison and return one result per operation per
    /// executed iteration.
    pub fn execute(&self) -> Vec<ComparisonResult> {
        match self.config.comparison_mode {
            ComparisonMode::Live => self.execute_live(),
            ComparisonMode::Baseline => self.execute_baseline(),
        }
    }

    fn execute_baseline(&self) -> Vec<ComparisonResult> {
        let Some(baseline) = self.config.baseline.as_ref() else {
            return vec![ComparisonResult::failure(
                "baseline",
                "Baseline mode requires a baseline configuration block",
            )];
        };
        let store = BaselineStore::new(baseline.storage_dir.clone());
        let runner = BaselineRunner::new(
            &self.config,
            store,
            self.transport_a.as_ref(),
            self.template.as_ref(),
        )
        .with_messaging(self.messaging_a.as_deref());
        match runner.execute() {
            Ok(results) => results,
            Err(e) => {
                error!(error = %e, "baseline mode failed");
                vec![ComparisonResult::failure(
                    "baseline",
                    &format!("Baseline mode failed: {e}"),
                )]
            }
        }
    }

    fn execute_live(&self) -> Vec<ComparisonResult> {
        let (Some(endpoint_a), Some(endpoint_b)) =
            (self.config.endpoint_a.as_ref(), self.config.endpoint_b.as_ref())
        else {
            return vec![ComparisonResult::failure(
                "comparison",
                "LIVE mode requires both endpoints to be configured",
            )];
        };

        let mut iterations = iteration::generate(
            &self.config.tokens,
            self.config.max_iterations,
            self.config.strategy,
        );
        if !self.config.tokens.is_empty() {
            // The untokenised template goes first as a control call.
            iterations.insert(0, Iteration::new());
        }
        let used_tokens = identify_used_tokens(&self.config);
        let options = self.diff_options();
        let protocol = self.config.test_type;
        let total = iterations.len();

        let mut results = Vec::new();
        for (index, tokens) in iterations.iter().enumerate() {
            if index > 0 && should_skip(tokens, &used_tokens) {
                info!(iteration = index + 1, "skipping iteration, no tokens in use");
                continue;
            }
            for op_a in &endpoint_a.operations {
                let Some(op_b) = endpoint_b
                    .operations
                    .iter()
                    .find(|op| op.name == op_a.name)
                else {
                    warn!(operation = %op_a.name, "endpoint B has no matching operation, skipping");
                    continue;
                };
                let mut result =
                    ComparisonResult::new(&operation_label(op_a, index == 0), tokens.clone());
                let outcome_a = execute_call(
                    self.transport_a.as_ref(),
                    self.messaging_a.as_deref(),
                    self.template.as_ref(),
                    &CallContext {
                        protocol,
                        base_url: &endpoint_a.base_url,
                        operation: op_a,
                        auth: endpoint_a.authentication.as_ref(),
                        iteration_number: index + 1,
                        total_iterations: total,
                    },
                    tokens,
                );
                let outcome_b = execute_call(
                    self.transport_b.as_ref(),
                    self.messaging_b.as_deref(),
                    self.template.as_ref(),
                    &CallContext {
                        protocol,
                        base_url: &endpoint_b.base_url,
                        operation: op_b,
                        auth: endpoint_b.authentication.as_ref(),
                        iteration_number: index + 1,
                        total_iterations: total,
                    },
                    tokens,
                );
                match (outcome_a, outcome_b) {
                    (Ok(a), Ok(b)) => {
                        result.outcome_a = Some(a);
                        result.outcome_b = Some(b);
                        diff::compare(&mut result, protocol, &options);
                    }
                    (a, b) => {
                        match a {
                            Ok(a) => result.outcome_a = Some(a),
                            Err(e) => result.mark_error(format!("API A call failed: {e}")),
                        }
                        match b {
                            Ok(b) => result.outcome_b = Some(b),
                            Err(e) => result.mark_error(format!("API B call failed: {e}")),
                        }
                    }
                }
                results.push(result);
            }
        }
        info!(results = results.len(), "live comparison finished");
        results
    }

    fn diff_options(&self) -> DiffOptions {
        DiffOptions {
            ignored_fields: self.config.ignored_fields.clone(),
            ignore_headers: self.config.ignore_headers,
            compare_error_responses: self.config.compare_error_responses,
        }
    }
}

/// Token names the configuration actually references, lowercased. A token is
/// in use if `{{name}}` appears in a URL, path, payload template, header, or
/// query value, or if the bare name occurs in any of those places.
pub(crate) fn identify_used_tokens(config: &RunConfig) -> HashSet<String> {
    let mut haystacks: Vec<String> = Vec::new();
    for endpoint in [config.endpoint_a.as_ref(), config.endpoint_b.as_ref()]
        .into_iter()
        .flatten()
    {
        haystacks.push(endpoint.base_url.to_lowercase());
        for op in &endpoint.operations {
            if let Some(path) = &op.path {
                haystacks.push(path.to_lowercase());
            }
            if let Some(template) = &op.payload_template {
                haystacks.push(template.to_lowercase());
            }
            haystacks.extend(op.headers.values().map(|v| v.to_lowercase()));
            haystacks.extend(op.query_params.values().map(|v| v.to_lowercase()));
        }
    }
    let mut used = HashSet::new();
    for name in config.tokens.keys() {
        let lowered = name.to_lowercase();
        let placeholder = format!("{{{{{lowered}}}}}");
        let hit = haystacks
            .iter()
            .any(|text| text.contains(&placeholder) || text.contains(&lowered));
        if hit {
            used.insert(lowered);
        } else {
            warn!(token = %name, "token is never referenced by the configuration");
        }
    }
    used
}

pub(crate) fn should_skip(tokens: &Iteration, used: &HashSet<String>) -> bool {
    !tokens.is_empty() && !tokens.keys().any(|name| used.contains(&name.to_lowercase()))
}

/// Build the request URL. SOAP endpoints use the base URL verbatim; other
/// protocols join base and path without duplicating a path already at the
/// tail, and the path lands before any query string the base carries. Query
/// parameters already present in the URL are not appended again. `{{token}}`
/// placeholders are substituted last.
pub(crate) fn construct_url(
    base_url: &str,
    operation: &OperationConfig,
    tokens: &Iteration,
    protocol: Protocol,
) -> String {
    let mut url = base_url.trim().to_string();
    if protocol != Protocol::Soap {
        if let Some(path) = operation.path.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            if url.ends_with('/') {
                url.truncate(url.len() - 1);
            }
            let normalized = if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            };
            let query_start = url.find('?');
            let already_present = url[..query_start.unwrap_or(url.len())].ends_with(&normalized);
            if !already_present {
                match query_start {
                    Some(idx) => url.insert_str(idx, &normalized),
                    None => url.push_str(&normalized),
                }
            }
        }
    }
    for (name, value) in &operation.query_params {
        if name.is_empty() || url.contains(&format!("{name}=")) {
            continue;
        }
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(name);
        url.push('=');
        url.push_str(value);
    }
    substitute(&url, tokens)
}

fn substitute(text: &str, tokens: &Iteration) -> String {
    let mut out = text.to_string();
    for (name, value) in tokens {
        out = out.replace(&format!("{{{{{name}}}}}"), value);
    }
    out
}

fn base_metadata(ctx: &CallContext<'_>, payload: Option<&str>) -> CallMetadata {
    let mut metadata = CallMetadata::new();
    if let Some(auth) = ctx.auth {
        let summary = auth.summary();
        if !summary.is_empty() {
            metadata.insert(
                "authentication".to_string(),
                serde_json::to_value(summary).unwrap_or_default(),
            );
        }
    }
    if !ctx.operation.query_params.is_empty() {
        metadata.insert(
            "queryParams".to_string(),
            serde_json::to_value(&ctx.operation.query_params).unwrap_or_default(),
        );
    }
    if let Some(payload) = payload {
        metadata.insert("requestSize".to_string(), serde_json::json!(payload.len()));
    }
    metadata.insert(
        "operation".to_string(),
        serde_json::json!(ctx.operation.name),
    );
    metadata.insert("method".to_string(), serde_json::json!(ctx.operation.method));
    metadata.insert(
        "testType".to_string(),
        serde_json::to_value(ctx.protocol).unwrap_or_default(),
    );
    metadata.insert(
        "iterationNumber".to_string(),
        serde_json::json!(ctx.iteration_number),
    );
    metadata.insert(
        "totalIterations".to_string(),
        serde_json::json!(ctx.total_iterations),
    );
    metadata
}

fn finish_metadata(mut metadata: CallMetadata, outcome: &CallOutcome) -> CallMetadata {
    if let Some(body) = &outcome.response_payload {
        metadata.insert("responseSize".to_string(), serde_json::json!(body.len()));
    }
    metadata.insert(
        "statusCode".to_string(),
        serde_json::json!(outcome.status_code.to_string()),
    );
    metadata.insert(
        "duration".to_string(),
        serde_json::json!(outcome.duration_ms),
    );
    metadata
}

/// Execute one operation against one side: HTTP for REST and SOAP, the
/// messaging seam for JMS. Fails only on transport-level problems; HTTP error
/// statuses come back as ordinary outcomes for the diff engine to classify.
pub(crate) fn execute_call(
    transport: &dyn Transport,
    messaging: Option<&dyn Messaging>,
    template: &dyn TemplateEngine,
    ctx: &CallContext<'_>,
    tokens: &Iteration,
) -> Result<CallOutcome> {
    let operation = ctx.operation;
    let payload = operation
        .payload_template
        .as_deref()
        .map(|t| template.render(t, tokens))
        .transpose()?;
    let mut headers: Headers = operation
        .headers
        .iter()
        .map(|(name, value)| (name.clone(), substitute(value, tokens)))
        .collect();
    if ctx.protocol == Protocol::Soap {
        if let Some(action) = &operation.soap_action {
            headers
                .entry("SOAPAction".to_string())
                .or_insert_with(|| action.clone());
        }
    }
    if payload.is_some() && !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
        let content_type = match ctx.protocol {
            Protocol::Rest => "application/json",
            Protocol::Soap => "text/xml; charset=utf-8",
            Protocol::Jms => "text/plain",
        };
        headers.insert("Content-Type".to_string(), content_type.to_string());
    }
    let metadata = base_metadata(ctx, payload.as_deref());

    if ctx.protocol == Protocol::Jms {
        let outcome = execute_jms_call(messaging, operation, headers, payload)?;
        let metadata = finish_metadata(metadata, &outcome);
        return Ok(outcome.with_metadata(metadata));
    }

    let url = construct_url(ctx.base_url, operation, tokens, ctx.protocol);
    let started = Instant::now();
    let response = transport.send_request(&url, &operation.method, &headers, payload.as_deref())?;
    let outcome = CallOutcome::new(&url, &operation.method)
        .with_status(response.status_code)
        .with_request(response.request_headers, payload)
        .with_response(response.headers, response.body)
        .with_duration(started.elapsed().as_millis() as u64);
    let metadata = finish_metadata(metadata, &outcome);
    Ok(outcome.with_metadata(metadata))
}

fn execute_jms_call(
    messaging: Option<&dyn Messaging>,
    operation: &OperationConfig,
    headers: Headers,
    payload: Option<String>,
) -> Result<CallOutcome> {
    let messaging = messaging.ok_or_else(|| {
        DriftError::Messaging("JMS run configured without a messaging provider".to_string())
    })?;
    let destination = operation.destination.as_deref().ok_or_else(|| {
        DriftError::Messaging(format!("operation {} has no destination", operation.name))
    })?;
    let payload = payload.unwrap_or_default();
    let started = Instant::now();
    messaging.send_message(destination, operation.destination_type, &payload, &headers)?;
    let reply = messaging.receive_once(destination, operation.destination_type, JMS_REPLY_TIMEOUT)?;
    let url = format!("jms:{destination}");
    let outcome = CallOutcome::new(&url, "SEND").with_request(headers, Some(payload));
    Ok(match reply {
        Some(message) => outcome
            .with_status(200)
            .with_response(message.headers, Some(message.payload))
            .with_duration(started.elapsed().as_millis() as u64),
        None => {
            warn!(destination, "no reply received before timeout");
            outcome
                .with_status(JMS_TIMEOUT_STATUS)
                .with_duration(started.elapsed().as_millis() as u64)
        }
    })
}
