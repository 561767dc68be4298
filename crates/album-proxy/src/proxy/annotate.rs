//! Span annotation vocabulary for the proxy pipeline.
//!
//! Two attribute namespaces are used on the request span:
//! - `proxy-service.*`: what this service received and returned to its caller
//! - `album-store.*`: what the upstream returned to this service

use http::StatusCode;
use opentelemetry::trace::Status;
use opentelemetry::{Key, Value};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const PROXY_REQUEST_BODY: &str = "proxy-service.request.body";
pub const PROXY_REQUEST_PARAMETERS: &str = "proxy-service.request.parameters";
pub const PROXY_RESPONSE_CODE: &str = "proxy-service.response.code";
pub const PROXY_RESPONSE_BODY: &str = "proxy-service.response.body";
pub const STORE_RESPONSE_CODE: &str = "album-store.response.code";
pub const STORE_RESPONSE_BODY: &str = "album-store.response.body";

/// Typed annotation calls made by the pipeline on the request span.
///
/// `mark_ok` and `mark_error` are terminal: the pipeline calls exactly one
/// of them per request.
pub trait SpanAnnotator {
    fn record_request_body(&self, raw: &str);
    fn record_parameters(&self, parameters: &str);
    fn record_upstream_code(&self, code: StatusCode);
    fn record_upstream_body(&self, raw: &str);
    fn record_response_code(&self, code: StatusCode);
    fn record_response_body(&self, raw: &str);
    fn mark_ok(&self);
    /// Set the Error status and add one event carrying `message`.
    fn mark_error(&self, message: &str);
}

fn set_str(span: &Span, key: &'static str, value: &str) {
    span.set_attribute(Key::from_static_str(key), Value::String(value.to_string().into()));
}

fn set_i64(span: &Span, key: &'static str, value: i64) {
    span.set_attribute(Key::from_static_str(key), Value::I64(value));
}

impl SpanAnnotator for Span {
    fn record_request_body(&self, raw: &str) {
        set_str(self, PROXY_REQUEST_BODY, raw);
    }

    fn record_parameters(&self, parameters: &str) {
        set_str(self, PROXY_REQUEST_PARAMETERS, parameters);
    }

    fn record_upstream_code(&self, code: StatusCode) {
        set_i64(self, STORE_RESPONSE_CODE, i64::from(code.as_u16()));
    }

    fn record_upstream_body(&self, raw: &str) {
        set_str(self, STORE_RESPONSE_BODY, raw);
    }

    fn record_response_code(&self, code: StatusCode) {
        set_i64(self, PROXY_RESPONSE_CODE, i64::from(code.as_u16()));
    }

    fn record_response_body(&self, raw: &str) {
        set_str(self, PROXY_RESPONSE_BODY, raw);
    }

    fn mark_ok(&self) {
        self.set_status(Status::Ok);
    }

    fn mark_error(&self, message: &str) {
        self.set_status(Status::error(message.to_string()));
        self.add_event(message.to_string(), Vec::new());
    }
}

#[cfg(test)]
pub mod recording {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Terminal {
        Ok,
        Error(String),
    }

    /// In-memory annotator used to assert what the pipeline recorded.
    #[derive(Default)]
    pub struct RecordingSpan {
        attributes: Mutex<BTreeMap<&'static str, String>>,
        terminals: Mutex<Vec<Terminal>>,
        events: Mutex<Vec<String>>,
    }

    impl RecordingSpan {
        pub fn attribute(&self, key: &str) -> Option<String> {
            self.attributes.lock().unwrap().get(key).cloned()
        }

        pub fn terminals(&self) -> Vec<Terminal> {
            self.terminals.lock().unwrap().clone()
        }

        pub fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }

        fn set(&self, key: &'static str, value: String) {
            self.attributes.lock().unwrap().insert(key, value);
        }
    }

    impl SpanAnnotator for RecordingSpan {
        fn record_request_body(&self, raw: &str) {
            self.set(PROXY_REQUEST_BODY, raw.to_string());
        }

        fn record_parameters(&self, parameters: &str) {
            self.set(PROXY_REQUEST_PARAMETERS, parameters.to_string());
        }

        fn record_upstream_code(&self, code: StatusCode) {
            self.set(STORE_RESPONSE_CODE, code.as_u16().to_string());
        }

        fn record_upstream_body(&self, raw: &str) {
            self.set(STORE_RESPONSE_BODY, raw.to_string());
        }

        fn record_response_code(&self, code: StatusCode) {
            self.set(PROXY_RESPONSE_CODE, code.as_u16().to_string());
        }

        fn record_response_body(&self, raw: &str) {
            self.set(PROXY_RESPONSE_BODY, raw.to_string());
        }

        fn mark_ok(&self) {
            self.terminals.lock().unwrap().push(Terminal::Ok);
        }

        fn mark_error(&self, message: &str) {
            self.terminals
                .lock()
                .unwrap()
                .push(Terminal::Error(message.to_string()));
            self.events.lock().unwrap().push(message.to_string());
        }
    }
}
