//! Axum HTTP server: router, listener, graceful shutdown.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::watch;
use tracing::{Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::config::ProxyConfig;
use crate::metrics;
use crate::model::ServerError;
use crate::proxy::annotate::SpanAnnotator;
use crate::proxy::client::UpstreamClient;
use crate::proxy::correlation::{self, REQUEST_ID_HEADER};
use crate::proxy::error::{Operation, ProxyError};
use crate::proxy::pipeline;

/// Shared application state. Immutable after startup.
pub struct AppState {
    pub config: ProxyConfig,
    pub upstream: Arc<dyn UpstreamClient>,
    pub metrics: PrometheusHandle,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/albums", get(handle_get_albums).post(handle_post_album))
        .route("/albums/{id}", get(handle_get_album_by_id))
        .route("/status", get(handle_status))
        .route("/metrics", get(handle_metrics))
        .fallback(handle_fallback)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

/// Build and run the HTTP server.
///
/// After a shutdown signal, in-flight requests get `shutdown_timeout_ms`
/// to finish before the server future is dropped.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let drain_timeout = Duration::from_millis(state.config.server.shutdown_timeout_ms);

    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "album-proxy listening");

    let (signalled_tx, mut signalled_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(true);
    });

    tokio::select! {
        result = server.into_future() => {
            result?;
            tracing::info!("album-proxy shut down gracefully");
        }
        () = drain_deadline(&mut signalled_rx, drain_timeout) => {
            tracing::warn!(
                timeout_ms = drain_timeout.as_millis() as u64,
                "Drain timeout elapsed, abandoning in-flight requests"
            );
        }
    }

    Ok(())
}

/// Completes `timeout` after the shutdown signal fires; pends forever otherwise.
async fn drain_deadline(signalled: &mut watch::Receiver<bool>, timeout: Duration) {
    if signalled.wait_for(|fired| *fired).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

/// Open the request span, parented on the caller's trace context if present.
fn request_span(name: &'static str, headers: &HeaderMap, request_id: &str) -> Span {
    let span = album_tracing::album_request_span!(name, request_id);
    if let Err(e) = span.set_parent(album_tracing::extract_parent(headers)) {
        tracing::debug!(error = ?e, span = name, "Could not attach inbound trace context");
    }
    span
}

/// Record latency and metrics, attach the request ID, and close the span.
fn finish(span: Span, route: &'static str, request_id: &str, start: Instant, response: impl IntoResponse) -> Response {
    let mut response = response.into_response();
    let latency = start.elapsed().as_millis() as u64;
    span.record("latency_ms", latency);
    metrics::record_request(route, response.status().as_u16(), start);

    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    span.in_scope(|| {
        tracing::info!(
            route = route,
            status = response.status().as_u16(),
            latency_ms = latency,
            "Request complete"
        );
    });
    response
}

/// GET /albums
async fn handle_get_albums(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let request_id = correlation::generate_id();
    let span = request_span(Operation::GetAlbums.span_name(), &headers, &request_id);
    let start = Instant::now();

    let response = pipeline::get_albums(state.upstream.as_ref(), state.config.upstream.base_url(), &span)
        .instrument(span.clone())
        .await;

    finish(span, "/albums", &request_id, start, response)
}

/// GET /albums/{id}
async fn handle_get_album_by_id(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = correlation::generate_id();
    let span = request_span(Operation::GetAlbumById.span_name(), &headers, &request_id);
    let start = Instant::now();

    let response = pipeline::get_album_by_id(
        state.upstream.as_ref(),
        state.config.upstream.base_url(),
        &id,
        &span,
    )
    .instrument(span.clone())
    .await;

    finish(span, "/albums/{id}", &request_id, start, response)
}

/// POST /albums
///
/// Body read failures are answered inside the span with the standard
/// envelope: 413 past `server.max_body_bytes`, 400 otherwise.
async fn handle_post_album(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let request_id = correlation::generate_id();
    let span = request_span(Operation::PostAlbum.span_name(), &headers, &request_id);
    let start = Instant::now();

    let response = match body {
        Ok(body) => {
            pipeline::post_album(state.upstream.as_ref(), state.config.upstream.base_url(), body, &span)
                .instrument(span.clone())
                .await
        }
        Err(rejection) => {
            let err = if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
                ProxyError::RequestTooLarge {
                    limit: state.config.server.max_body_bytes,
                }
            } else {
                ProxyError::RequestUnreadable {
                    reason: rejection.body_text(),
                }
            };
            span.in_scope(|| pipeline::reject_post_album(err, &span))
        }
    };

    finish(span, "/albums", &request_id, start, response)
}

/// GET /status
async fn handle_status(headers: HeaderMap) -> Response {
    let request_id = correlation::generate_id();
    let span = request_span("/status", &headers, &request_id);
    let start = Instant::now();

    span.record_response_code(StatusCode::OK);
    span.mark_ok();
    let response = (
        StatusCode::OK,
        axum::Json(serde_json::json!({ "status": "OK" })),
    );

    finish(span, "/status", &request_id, start, response)
}

/// GET /metrics: Prometheus text exposition.
async fn handle_metrics(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let request_id = correlation::generate_id();
    let span = request_span("/metrics", &headers, &request_id);
    let start = Instant::now();

    span.record_response_code(StatusCode::OK);
    span.mark_ok();
    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Body::from(state.metrics.render()))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "Failed to build metrics response");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        });

    finish(span, "/metrics", &request_id, start, response)
}

/// Unknown routes get the standard error envelope.
async fn handle_fallback(request: Request) -> Response {
    tracing::debug!(path = %request.uri().path(), method = %request.method(), "No route matched");
    (
        StatusCode::NOT_FOUND,
        axum::Json(ServerError::new(format!("no route for {}", request.uri().path()))),
    )
        .into_response()
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, draining connections..."),
        () = terminate => tracing::info!("Received SIGTERM, draining connections..."),
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Method;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use opentelemetry::trace::{Status, TracerProvider as _};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, InMemorySpanExporterBuilder, SdkTracerProvider, SpanData};
    use tower::ServiceExt;
    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;
    use crate::proxy::annotate::{
        PROXY_REQUEST_PARAMETERS, PROXY_RESPONSE_BODY, PROXY_RESPONSE_CODE, STORE_RESPONSE_BODY,
        STORE_RESPONSE_CODE,
    };
    use crate::proxy::client::mock::MockUpstream;

    const ALBUM: &str = r#"{"artist":"Black Sabbath","id":10,"price":66.6,"title":"The Ozzman Cometh"}"#;

    fn router_with(config: ProxyConfig, upstream: Arc<MockUpstream>) -> Router {
        let state = AppState {
            config,
            upstream,
            metrics: PrometheusBuilder::new().build_recorder().handle(),
        };
        build_router(Arc::new(state))
    }

    fn router(upstream: Arc<MockUpstream>) -> Router {
        router_with(ProxyConfig::default(), upstream)
    }

    async fn call(
        app: Router,
        method: Method,
        uri: &str,
        body: impl Into<Body>,
    ) -> (StatusCode, HeaderMap, String) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    /// Route spans of the calling thread into an in-memory exporter.
    struct ExportedSpans {
        exporter: InMemorySpanExporter,
        _provider: SdkTracerProvider,
        _guard: DefaultGuard,
    }

    impl ExportedSpans {
        fn install() -> Self {
            let exporter = InMemorySpanExporterBuilder::new().build();
            let provider = SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build();
            let subscriber = tracing_subscriber::registry()
                .with(album_tracing::span_layer(provider.tracer("album-proxy-test")));
            Self {
                exporter,
                _provider: provider,
                _guard: tracing::subscriber::set_default(subscriber),
            }
        }

        /// The single span exported so far.
        fn only(&self) -> SpanData {
            let mut spans = self.exporter.get_finished_spans().unwrap();
            assert_eq!(spans.len(), 1, "expected one span, got {spans:?}");
            spans.remove(0)
        }
    }

    fn attribute(span: &SpanData, key: &str) -> Option<String> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| kv.value.to_string())
    }

    fn event_names(span: &SpanData) -> Vec<String> {
        span.events.iter().map(|e| e.name.to_string()).collect()
    }

    fn assert_exported_error(span: &SpanData, message: &str, code: &str) {
        assert_eq!(span.status, Status::error(message.to_string()));
        assert_eq!(event_names(span), vec![message.to_string()]);
        assert_eq!(attribute(span, PROXY_RESPONSE_CODE).as_deref(), Some(code));
        assert_eq!(
            attribute(span, PROXY_RESPONSE_BODY),
            Some(format!(r#"{{"message":"{message}"}}"#))
        );
    }

    #[tokio::test]
    async fn test_post_album_round_trip() {
        let upstream = Arc::new(MockUpstream::echoing(201));
        let (status, headers, body) = call(router(upstream.clone()), Method::POST, "/albums", ALBUM).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, ALBUM);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert!(headers.contains_key(REQUEST_ID_HEADER));
        assert_eq!(upstream.calls()[0].url, "http://localhost:9080/albums");
    }

    #[tokio::test]
    async fn test_post_album_larger_than_a_mebibyte_is_forwarded() {
        let title = "a".repeat(1024 * 1024 + 10);
        let album = format!(r#"{{"artist":"Black Sabbath","id":10,"price":66.6,"title":"{title}"}}"#);
        let upstream = Arc::new(MockUpstream::echoing(201));

        let (status, _, body) = call(router(upstream.clone()), Method::POST, "/albums", album.clone()).await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body, album);
        assert_eq!(upstream.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_post_album_over_limit_is_payload_too_large() {
        let mut config = ProxyConfig::default();
        config.server.max_body_bytes = 64;
        let upstream = Arc::new(MockUpstream::echoing(201));
        let spans = ExportedSpans::install();

        let (status, _, body) = call(router_with(config, upstream.clone()), Method::POST, "/albums", ALBUM).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body, r#"{"message":"request body exceeds 64 bytes"}"#);
        assert!(upstream.calls().is_empty());
        assert_exported_error(&spans.only(), "request body exceeds 64 bytes", "413");
    }

    #[tokio::test]
    async fn test_get_album_by_invalid_id() {
        let upstream = Arc::new(MockUpstream::replying(200, ALBUM));
        let (status, _, body) = call(router(upstream.clone()), Method::GET, "/albums/X", "").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, r#"{"message":"error invalid ID [X] requested"}"#);
        assert!(upstream.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_albums_transport_error() {
        let upstream = Arc::new(MockUpstream::failing("connection refused"));
        let (status, _, body) = call(router(upstream), Method::GET, "/albums", "").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            r#"{"message":"error contacting album-store getAlbums connection refused"}"#
        );
    }

    #[tokio::test]
    async fn test_exported_span_success_has_no_events() {
        let albums = format!("[{ALBUM}]");
        let upstream = Arc::new(MockUpstream::replying(200, &albums));
        let spans = ExportedSpans::install();

        let (status, _, _) = call(router(upstream), Method::GET, "/albums", "").await;

        let span = spans.only();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(span.name, "/albums GET");
        assert_eq!(span.status, Status::Ok);
        assert!(event_names(&span).is_empty(), "events: {:?}", event_names(&span));
        assert_eq!(attribute(&span, PROXY_RESPONSE_CODE).as_deref(), Some("200"));
        assert_eq!(attribute(&span, PROXY_RESPONSE_BODY), Some(albums.clone()));
        assert_eq!(attribute(&span, STORE_RESPONSE_CODE).as_deref(), Some("200"));
        assert_eq!(attribute(&span, STORE_RESPONSE_BODY), Some(albums));
    }

    #[tokio::test]
    async fn test_exported_span_transport_error() {
        let upstream = Arc::new(MockUpstream::failing("boom"));
        let spans = ExportedSpans::install();

        call(router(upstream), Method::GET, "/albums", "").await;

        let span = spans.only();
        assert_exported_error(&span, "error contacting album-store getAlbums boom", "500");
        assert_eq!(attribute(&span, STORE_RESPONSE_CODE), None);
    }

    #[tokio::test]
    async fn test_exported_span_upstream_status() {
        let upstream = Arc::new(MockUpstream::replying(404, r#"{"message":"Album [7] not found"}"#));
        let spans = ExportedSpans::install();

        let (status, _, _) = call(router(upstream), Method::GET, "/albums/7", "").await;

        let span = spans.only();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(span.name, "/albums/:id GET");
        assert_exported_error(&span, "album-store returned error getAlbumById", "404");
        assert_eq!(attribute(&span, STORE_RESPONSE_CODE).as_deref(), Some("404"));
        assert_eq!(attribute(&span, PROXY_REQUEST_PARAMETERS).as_deref(), Some("ID=7"));
    }

    #[tokio::test]
    async fn test_exported_span_malformed_response() {
        let upstream = Arc::new(MockUpstream::replying(201, "{"));
        let spans = ExportedSpans::install();

        call(router(upstream), Method::POST, "/albums", ALBUM).await;

        let span = spans.only();
        assert_exported_error(&span, "error from album-store postAlbum malformed JSON", "500");
        assert_eq!(attribute(&span, STORE_RESPONSE_BODY).as_deref(), Some("{"));
    }

    #[tokio::test]
    async fn test_exported_span_invalid_id() {
        let upstream = Arc::new(MockUpstream::replying(200, ALBUM));
        let spans = ExportedSpans::install();

        call(router(upstream), Method::GET, "/albums/X", "").await;

        let span = spans.only();
        assert_exported_error(&span, "error invalid ID [X] requested", "400");
        assert_eq!(attribute(&span, PROXY_REQUEST_PARAMETERS).as_deref(), Some("ID=X"));
        assert_eq!(attribute(&span, STORE_RESPONSE_CODE), None);
    }

    #[tokio::test]
    async fn test_status() {
        let upstream = Arc::new(MockUpstream::failing("unused"));
        let (status, _, body) = call(router(upstream), Method::GET, "/status", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"OK"}"#);
    }

    #[tokio::test]
    async fn test_metrics_is_text() {
        let upstream = Arc::new(MockUpstream::failing("unused"));
        let (status, headers, _) = call(router(upstream), Method::GET, "/metrics", "").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain; version=0.0.4");
    }

    #[tokio::test]
    async fn test_unknown_route_uses_envelope() {
        let upstream = Arc::new(MockUpstream::failing("unused"));
        let (status, _, body) = call(router(upstream), Method::GET, "/nope", "").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, r#"{"message":"no route for /nope"}"#);
    }
}
