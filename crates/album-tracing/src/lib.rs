//! Reusable OTLP tracing library for album-proxy and album-store.

pub mod config;
pub mod otlp;
pub mod propagation;
pub mod spans;

pub use config::{OtlpProtocol, TracingConfig};
pub use otlp::{init_tracing, span_layer, TracingGuard};
pub use propagation::{extract_parent, inject_context};
