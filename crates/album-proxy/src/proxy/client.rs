//! Upstream transport used to reach album-store.
//!
//! The pipeline only sees the [`UpstreamClient`] trait, so the real reqwest
//! transport can be swapped for a deterministic double in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

/// A single request to the upstream service.
#[derive(Debug, Clone)]
pub struct UpstreamRequest {
    pub method: Method,
    pub url: String,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl UpstreamRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    /// POST with `content-type: application/json`; `body` is sent byte for byte.
    pub fn post_json(url: impl Into<String>, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            content_type: Some("application/json"),
            body,
        }
    }
}

/// Status and fully read body returned by the upstream.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Transport-level failure: the upstream never produced a complete response.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            UpstreamError::Timeout(e.to_string())
        } else if e.is_connect() {
            UpstreamError::Connect(e.to_string())
        } else {
            UpstreamError::Other(e.to_string())
        }
    }
}

// async_trait so the client can live behind Arc<dyn UpstreamClient>.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError>;
}

/// reqwest-backed transport. Cheap to clone; the connection pool is shared.
///
/// Every request carries the current span's trace context, so album-store
/// spans join the proxy's trace.
#[derive(Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstream {
    async fn send(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        let mut trace_headers = HeaderMap::new();
        album_tracing::inject_context(&Span::current().context(), &mut trace_headers);

        let mut req_builder = self
            .client
            .request(request.method, &request.url)
            .headers(trace_headers);
        if let Some(content_type) = request.content_type {
            req_builder = req_builder.header(http::header::CONTENT_TYPE, content_type);
        }
        if !request.body.is_empty() {
            req_builder = req_builder.body(request.body);
        }

        let resp = req_builder.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;

        tracing::debug!(
            status = status.as_u16(),
            bytes = body.len(),
            "Upstream response read"
        );

        Ok(UpstreamResponse { status, body })
    }
}
