//! Span builder helpers for album service instrumentation.

/// Create the tracing span for one inbound HTTP request.
///
/// Usage: `let span = album_request_span!("/albums GET", request_id);`
///
/// `otel.name` becomes the exported span name; `otel.status_code` and the
/// `proxy-service.*` / `album-store.*` attributes are set later through
/// `OpenTelemetrySpanExt`.
#[macro_export]
macro_rules! album_request_span {
    ($name:expr, $request_id:expr) => {
        tracing::info_span!(
            "album_request",
            otel.name = %$name,
            otel.kind = "server",
            request_id = %$request_id,
            latency_ms = tracing::field::Empty,
        )
    };
}
