//! Transport seams: HTTP, messaging, and payload templating.
//!
//! The runner only ever talks to these traits, so tests drive it with
//! in-memory fakes and the JMS side stays pluggable without a broker client
//! baked into the crate.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::config::Authentication;
use crate::errors::{DriftError, Result};
use crate::iteration::Iteration;
use crate::outcome::Headers;
use crate::protocol::DestinationType;

/// Raw result of one HTTP exchange.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status_code: u16,
    pub headers: Headers,
    pub body: Option<String>,
    /// Headers actually sent, including any transport-added auth header.
    pub request_headers: Headers,
}

/// One synchronous request/response exchange. Implementations own their
/// credential material; the runner never sees secrets.
pub trait Transport {
    fn send_request(
        &self,
        url: &str,
        method: &str,
        headers: &Headers,
        payload: Option<&str>,
    ) -> Result<TransportResponse>;
}

/// Per-iteration payload rendering.
pub trait TemplateEngine {
    fn render(&self, template: &str, tokens: &Iteration) -> Result<String>;
}

/// A message pulled off a destination.
#[derive(Debug, Clone, Default)]
pub struct ReceivedMessage {
    pub payload: String,
    pub headers: Headers,
}

/// Point-to-point and pub/sub messaging, the JMS-shaped seam. No broker
/// client ships with the crate; deployments inject their own implementation.
pub trait Messaging {
    fn send_message(
        &self,
        destination: &str,
        destination_type: DestinationType,
        payload: &str,
        headers: &Headers,
    ) -> Result<()>;

    /// Inspect a queue's pending messages without consuming them.
    fn browse(&self, queue: &str) -> Result<Vec<ReceivedMessage>>;

    /// Wait up to `timeout` for a single reply.
    fn receive_once(
        &self,
        destination: &str,
        destination_type: DestinationType,
        timeout: Duration,
    ) -> Result<Option<ReceivedMessage>>;

    /// Drain up to `max` messages without blocking past `timeout` per read.
    fn receive_multiple(
        &self,
        destination: &str,
        destination_type: DestinationType,
        max: usize,
        timeout: Duration,
    ) -> Result<Vec<ReceivedMessage>> {
        let mut messages = Vec::new();
        while messages.len() < max {
            match self.receive_once(destination, destination_type, timeout)? {
                Some(message) => messages.push(message),
                None => break,
            }
        }
        Ok(messages)
    }

    /// Start background consumers on a destination.
    fn start_listeners(
        &self,
        count: usize,
        destination: &str,
        destination_type: DestinationType,
    ) -> Result<()>;

    /// Stop all consumers started by [`start_listeners`](Self::start_listeners).
    fn stop_listeners(&self) -> Result<()>;
}

/// HTTP transport over a blocking reqwest client. Basic auth and mTLS are
/// configured at construction from the endpoint's [`Authentication`].
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    auth: Option<Authentication>,
}

impl HttpTransport {
    pub fn new(auth: Option<Authentication>) -> Result<Self> {
        let mut builder = reqwest::blocking::Client::builder().timeout(Duration::from_secs(60));
        if let Some(auth) = auth.as_ref().filter(|a| a.use_mtls) {
            builder = apply_mtls(builder, auth)?;
        }
        let client = builder
            .build()
            .map_err(|e| DriftError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, auth })
    }

    fn auth_header(&self) -> Option<String> {
        let auth = self.auth.as_ref().filter(|a| a.enable_auth)?;
        let client_id = auth.client_id.as_deref()?;
        let secret = auth.client_secret.as_deref().unwrap_or_default();
        Some(format!(
            "Basic {}",
            BASE64.encode(format!("{client_id}:{secret}"))
        ))
    }
}

fn apply_mtls(
    mut builder: reqwest::blocking::ClientBuilder,
    auth: &Authentication,
) -> Result<reqwest::blocking::ClientBuilder> {
    let read = |path: &str| {
        fs::read(path).map_err(|e| DriftError::Transport(format!("cannot read {path}: {e}")))
    };
    if let Some(pfx) = auth.pfx_path.as_deref().filter(|p| !p.is_empty()) {
        let passphrase = auth.passphrase.as_deref().unwrap_or_default();
        let identity = reqwest::Identity::from_pkcs12_der(&read(pfx)?, passphrase)
            .map_err(|e| DriftError::Transport(format!("invalid pfx {pfx}: {e}")))?;
        builder = builder.identity(identity);
    } else if let (Some(cert), Some(key)) = (
        auth.client_cert_path.as_deref().filter(|p| !p.is_empty()),
        auth.client_key_path.as_deref().filter(|p| !p.is_empty()),
    ) {
        let identity = reqwest::Identity::from_pkcs8_pem(&read(cert)?, &read(key)?)
            .map_err(|e| DriftError::Transport(format!("invalid client cert {cert}: {e}")))?;
        builder = builder.identity(identity);
    }
    if let Some(ca) = auth.ca_cert_path.as_deref().filter(|p| !p.is_empty()) {
        let certificate = reqwest::Certificate::from_pem(&read(ca)?)
            .map_err(|e| DriftError::Transport(format!("invalid CA cert {ca}: {e}")))?;
        builder = builder.add_root_certificate(certificate);
    }
    Ok(builder)
}

impl Transport for HttpTransport {
    fn send_request(
        &self,
        url: &str,
        method: &str,
        headers: &Headers,
        payload: Option<&str>,
    ) -> Result<TransportResponse> {
        let method = reqwest::Method::from_bytes(method.to_uppercase().as_bytes())
            .map_err(|e| DriftError::Transport(format!("invalid method {method}: {e}")))?;
        let mut sent_headers = headers.clone();
        if let Some(auth) = self.auth_header() {
            sent_headers.insert("Authorization".to_string(), auth);
        }
        let mut request = self.client.request(method, url);
        for (name, value) in &sent_headers {
            request = request.header(name, value);
        }
        if let Some(payload) = payload {
            request = request.body(payload.to_string());
        }
        debug!(url, "sending request");
        let response = request
            .send()
            .map_err(|e| DriftError::Transport(format!("request to {url} failed: {e}")))?;
        let status_code = response.status().as_u16();
        let mut response_headers = Headers::new();
        for (name, value) in response.headers() {
            response_headers.insert(
                name.to_string(),
                value.to_str().unwrap_or_default().to_string(),
            );
        }
        let body = response
            .text()
            .map(|t| if t.is_empty() { None } else { Some(t) })
            .map_err(|e| DriftError::Transport(format!("reading body from {url} failed: {e}")))?;
        Ok(TransportResponse {
            status_code,
            headers: response_headers,
            body,
            request_headers: sent_headers,
        })
    }
}

/// `{{token}}` substitution over inline text or a template file. A template
/// string naming an existing file is read first, then substituted.
#[derive(Debug, Clone, Default)]
pub struct TokenTemplate;

impl TemplateEngine for TokenTemplate {
    fn render(&self, template: &str, tokens: &Iteration) -> Result<String> {
        let mut text = if looks_like_path(template) && Path::new(template).is_file() {
            fs::read_to_string(template)
                .map_err(|e| DriftError::Template(format!("cannot read {template}: {e}")))?
        } else {
            template.to_string()
        };
        for (name, value) in tokens {
            text = text.replace(&format!("{{{{{name}}}}}"), value);
        }
        Ok(text)
    }
}

fn looks_like_path(template: &str) -> bool {
    !template.trim_start().starts_with(['{', '<']) && !template.contains('\n')
}
