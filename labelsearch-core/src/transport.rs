//! HTTP/JSON transport to the search backend.
//!
//! [`Transport`] performs exactly one request. Retrying, backoff and the
//! mapping of HTTP statuses onto [`Error`] live in [`execute`] so every
//! transport implementation gets the same failure semantics.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::error::{Error, Result};

const MAPPER_CONFLICT_MARKER: &str = "mapper [";

/// HTTP method of a backend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Json(Value),
    /// Newline-delimited JSON for `_bulk`. Must end with a newline.
    NdJson(String),
}

/// One backend request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Path and query string, relative to the cluster URL.
    pub path: String,
    pub body: Option<Body>,
    /// Name of the engine operation, used in errors and logs.
    pub operation: &'static str,
}

impl Request {
    pub fn new(operation: &'static str, method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            operation,
        }
    }

    /// Attaches a JSON body. Chainable.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(Body::Json(body));
        self
    }

    /// Attaches an NDJSON body. Chainable.
    pub fn ndjson(mut self, body: String) -> Self {
        self.body = Some(Body::NdJson(body));
        self
    }
}

/// Raw backend answer.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Parsed body, `Value::Null` when empty.
    pub body: Value,
}

impl Response {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }

    /// Backend error type (`error.type`), if the body carries one.
    pub fn error_kind(&self) -> Option<&str> {
        self.body.get("error")?.get("type")?.as_str()
    }

    /// Backend error reason, falling back to the raw body.
    pub fn error_reason(&self) -> String {
        match self.body.get("error") {
            Some(Value::Object(error)) => error
                .get("reason")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| Value::Object(error.clone()).to_string()),
            Some(Value::String(reason)) => reason.clone(),
            _ => self.body.to_string(),
        }
    }

    fn is_retryable(&self) -> bool {
        self.status >= 500 || self.status == 429
    }
}

/// Sends single requests to the backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one attempt. Only network-level failures are errors; any
    /// HTTP status is returned as a [`Response`].
    async fn send(&self, request: &Request) -> Result<Response>;
}

/// Bounded exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.max_retries, config.retry_backoff())
    }

    /// Delay before retry number `attempt` (1-based): `backoff * 2^(attempt-1)`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Sends a request, retrying timeouts, connection failures, 5xx and 429.
///
/// Returns successful responses and 404s as-is so callers can decide whether
/// a missing document or index is an error. Other 4xx statuses are fatal and
/// surfaced verbatim.
pub async fn execute(
    transport: &dyn Transport,
    request: &Request,
    retry: &RetryPolicy,
) -> Result<Response> {
    let mut attempt = 0;
    loop {
        debug!(
            operation = request.operation,
            method = request.method.as_str(),
            path = %request.path,
            attempt,
            "backend request"
        );

        let reason = match transport.send(request).await {
            Ok(response) if response.is_retryable() => {
                format!("status {}: {}", response.status, response.error_reason())
            }
            Ok(response) if response.is_success() || response.is_not_found() => {
                return Ok(response)
            }
            Ok(response) => return Err(client_error(request, &response)),
            Err(e) if e.is_transient() => e.to_string(),
            Err(e) => return Err(e),
        };

        if attempt >= retry.max_retries {
            return Err(Error::Transient {
                operation: request.operation,
                reason: format!("{} (after {} attempts)", reason, attempt + 1),
            });
        }
        attempt += 1;
        let delay = retry.delay(attempt);
        warn!(
            operation = request.operation,
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %reason,
            "retrying backend request"
        );
        tokio::time::sleep(delay).await;
    }
}

fn client_error(request: &Request, response: &Response) -> Error {
    let kind = response.error_kind().unwrap_or("unknown").to_string();
    let reason = response.error_reason();
    let index = || {
        response
            .body
            .pointer("/error/index")
            .and_then(Value::as_str)
            .unwrap_or_else(|| request.path.split('/').next().unwrap_or_default())
            .to_string()
    };
    if kind == "resource_already_exists_exception" {
        return Error::SchemaConflict { index: index() };
    }
    // A mapping PUT that redeclares a field with another type.
    if kind == "illegal_argument_exception"
        && request.operation.starts_with("configure_")
        && reason.contains(MAPPER_CONFLICT_MARKER)
    {
        return Error::SchemaConflict { index: index() };
    }
    Error::Backend {
        operation: request.operation,
        status: response.status,
        kind,
        reason,
    }
}

/// [`Transport`] over a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<(String, Option<String>)>,
}

impl HttpTransport {
    /// Builds a client with the configured timeout and basic auth.
    pub fn new(config: &EngineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            credentials: config
                .username
                .clone()
                .map(|user| (user, config.password.clone())),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        };
        let mut builder = self.client.request(method, self.url(&request.path));
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, password.as_ref());
        }
        builder = match &request.body {
            Some(Body::Json(body)) => builder.json(body),
            Some(Body::NdJson(body)) => builder
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body.clone()),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            // Proxies in front of the cluster may answer with plain text.
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(Response { status, body })
    }
}
