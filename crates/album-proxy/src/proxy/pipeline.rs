//! Request/response pipeline for the proxied album operations.
//!
//! Each operation runs the same steps, any of which may fail terminally:
//!
//! 1. Validate the client input (path id or JSON body)
//! 2. Forward one request to album-store
//! 3. Check the upstream status against the operation's success set
//! 4. Decode the upstream body as JSON and re-serialize it
//!
//! The request span is passed in explicitly. Exactly one of `mark_ok` /
//! `mark_error` is called on it, and `proxy-service.response.code` is
//! written once with the status actually returned.

use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use http::StatusCode;

use super::annotate::SpanAnnotator;
use super::client::{UpstreamClient, UpstreamRequest};
use super::codec;
use super::error::{Operation, ProxyError};

/// Final status and JSON body for the caller.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}

/// GET /albums
pub async fn get_albums<S>(upstream: &dyn UpstreamClient, base_url: &str, span: &S) -> ProxyResponse
where
    S: SpanAnnotator + ?Sized,
{
    let op = Operation::GetAlbums;
    let result = forward(upstream, op, UpstreamRequest::get(format!("{base_url}/albums")), span).await;
    complete(op, result, span)
}

/// GET /albums/{id}
pub async fn get_album_by_id<S>(
    upstream: &dyn UpstreamClient,
    base_url: &str,
    raw_id: &str,
    span: &S,
) -> ProxyResponse
where
    S: SpanAnnotator + ?Sized,
{
    let op = Operation::GetAlbumById;
    span.record_parameters(&format!("ID={raw_id}"));

    let album_id: i64 = match raw_id.parse() {
        Ok(id) => id,
        Err(_) => {
            return complete(
                op,
                Err(ProxyError::InvalidId {
                    id: raw_id.to_string(),
                }),
                span,
            )
        }
    };

    let request = UpstreamRequest::get(format!("{base_url}/albums/{album_id}"));
    let result = forward(upstream, op, request, span).await;
    complete(op, result, span)
}

/// POST /albums
///
/// The inbound bytes are forwarded unchanged once they decode as JSON.
pub async fn post_album<S>(
    upstream: &dyn UpstreamClient,
    base_url: &str,
    body: Bytes,
    span: &S,
) -> ProxyResponse
where
    S: SpanAnnotator + ?Sized,
{
    let op = Operation::PostAlbum;
    let raw = codec::raw_text(&body);
    span.record_request_body(&raw);

    if codec::decode(&body).is_err() {
        return complete(op, Err(ProxyError::InvalidRequestBody { raw }), span);
    }

    let request = UpstreamRequest::post_json(format!("{base_url}/albums"), body);
    let result = forward(upstream, op, request, span).await;
    complete(op, result, span)
}

/// POST /albums whose body could not be read in full. Nothing is forwarded.
pub fn reject_post_album<S>(err: ProxyError, span: &S) -> ProxyResponse
where
    S: SpanAnnotator + ?Sized,
{
    complete(Operation::PostAlbum, Err(err), span)
}

/// Send one request upstream and return the re-serialized JSON body.
async fn forward<S>(
    upstream: &dyn UpstreamClient,
    op: Operation,
    request: UpstreamRequest,
    span: &S,
) -> Result<Bytes, ProxyError>
where
    S: SpanAnnotator + ?Sized,
{
    tracing::debug!(op = %op, method = %request.method, url = %request.url, "Forwarding to album-store");

    let response = upstream
        .send(request)
        .await
        .map_err(|source| ProxyError::UpstreamTransport { op, source })?;

    span.record_upstream_code(response.status);
    span.record_upstream_body(&codec::raw_text(&response.body));

    if !op.accepts(response.status) {
        return Err(ProxyError::UpstreamStatus {
            op,
            status: response.status,
        });
    }

    let decoded = codec::decode(&response.body).map_err(|e| ProxyError::UpstreamMalformed {
        op,
        raw: e.into_raw(),
    })?;

    decoded.to_bytes().map_err(|_| ProxyError::UpstreamMalformed {
        op,
        raw: decoded.raw().to_string(),
    })
}

/// Write the terminal annotations and build the caller's response.
fn complete<S>(op: Operation, result: Result<Bytes, ProxyError>, span: &S) -> ProxyResponse
where
    S: SpanAnnotator + ?Sized,
{
    match result {
        Ok(body) => {
            let status = op.success_status();
            span.record_response_code(status);
            span.record_response_body(&codec::raw_text(&body));
            span.mark_ok();
            ProxyResponse { status, body }
        }
        Err(err) => {
            let status = err.status();
            let envelope = err.envelope().to_json();

            span.record_response_code(status);
            span.record_response_body(&envelope);
            span.mark_error(&err.to_string());

            if err.is_client_error() {
                tracing::info!(op = %op, status = status.as_u16(), error = %err, "Rejected client request");
            } else {
                tracing::warn!(op = %op, status = status.as_u16(), error = %err, "album-store call failed");
            }

            ProxyResponse {
                status,
                body: Bytes::from(envelope),
            }
        }
    }
}
