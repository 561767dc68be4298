//! Axum HTTP server for the album collection.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{MatchedPath, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use opentelemetry::trace::Status;
use opentelemetry::{Key, Value};
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::{Album, AlbumInput};
use crate::store::AlbumStore;

/// Shared application state.
pub struct AppState {
    pub config: StoreConfig,
    pub store: AlbumStore,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/albums", get(handle_list).post(handle_post))
        .route("/albums/{id}", get(handle_get))
        .route("/status", get(handle_status))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request| {
                    let path = request
                        .extensions()
                        .get::<MatchedPath>()
                        .map(|p| p.as_str().replace("{id}", ":id"))
                        .unwrap_or_else(|| request.uri().path().to_string());
                    let name = format!("{path} {}", request.method());
                    let span = album_tracing::album_request_span!(name, Uuid::new_v4());
                    if let Err(e) = span.set_parent(album_tracing::extract_parent(request.headers())) {
                        tracing::debug!(error = ?e, span = %name, "Could not attach inbound trace context");
                    }
                    span
                })
                .on_response(|response: &Response, latency: Duration, span: &Span| {
                    span.record("latency_ms", latency.as_millis() as u64);
                    tracing::info!(
                        status = response.status().as_u16(),
                        latency_ms = latency.as_millis() as u64,
                        "Request complete"
                    );
                }),
        )
        .with_state(state)
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let drain_timeout = Duration::from_millis(state.config.server.shutdown_timeout_ms);

    let app = build_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "album-store listening");

    let (signalled_tx, mut signalled_rx) = watch::channel(false);
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        let _ = signalled_tx.send(true);
    });

    tokio::select! {
        result = server.into_future() => {
            result?;
            tracing::info!("album-store shut down gracefully");
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

async fn drain_deadline(signalled: &mut watch::Receiver<bool>, timeout: Duration) {
    if signalled.wait_for(|fired| *fired).await.is_err() {
        std::future::pending::<()>().await;
    }
    tokio::time::sleep(timeout).await;
}

fn set_code(span: &Span, status: StatusCode) {
    span.set_attribute(
        Key::from_static_str("http.status_code"),
        Value::I64(i64::from(status.as_u16())),
    );
}

fn ok<T: serde::Serialize>(span: &Span, status: StatusCode, body: T) -> Response {
    set_code(span, status);
    span.set_status(Status::Ok);
    (status, axum::Json(body)).into_response()
}

/// Annotate the span with the failure and build the error envelope.
fn fail(span: &Span, err: StoreError) -> Response {
    let status = err.status();
    let event = match &err {
        StoreError::Validation(errors) => {
            serde_json::to_string(errors).unwrap_or_else(|_| err.to_string())
        }
        _ => err.to_string(),
    };

    set_code(span, status);
    span.set_status(Status::error(err.to_string()));
    span.add_event(event.clone(), Vec::new());
    tracing::warn!(status = status.as_u16(), error = %event, "Request rejected");

    err.into_response()
}

/// GET /albums
async fn handle_list(State(state): State<Arc<AppState>>) -> Response {
    let span = Span::current();
    ok(&span, StatusCode::OK, state.store.list().await)
}

/// GET /albums/{id}
async fn handle_get(State(state): State<Arc<AppState>>, Path(raw_id): Path<String>) -> Response {
    let span = Span::current();
    span.set_attribute(
        Key::from_static_str("http.request.id"),
        Value::String(raw_id.clone().into()),
    );

    match lookup(&state.store, &raw_id).await {
        Ok(album) => ok(&span, StatusCode::OK, album),
        Err(e) => fail(&span, e),
    }
}

async fn lookup(store: &AlbumStore, raw_id: &str) -> Result<Album, StoreError> {
    let id: i64 = raw_id
        .parse()
        .map_err(|_| StoreError::InvalidId(raw_id.to_string()))?;
    store.get(id).await.ok_or(StoreError::NotFound(id))
}

/// POST /albums
async fn handle_post(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let span = Span::current();

    let album = match bind_album(&body) {
        Ok(album) => album,
        Err(e) => return fail(&span, e),
    };

    let count = state.store.append(album.clone()).await;
    tracing::info!(id = album.id, count = count, "Album added");
    ok(&span, StatusCode::CREATED, album)
}

fn bind_album(body: &[u8]) -> Result<Album, StoreError> {
    let input: AlbumInput =
        serde_json::from_slice(body).map_err(|e| StoreError::MalformedBody(e.to_string()))?;
    input.validate().map_err(StoreError::Validation)
}

/// GET /status
async fn handle_status() -> Response {
    let span = Span::current();
    ok(&span, StatusCode::OK, serde_json::json!({ "status": "OK" }))
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
