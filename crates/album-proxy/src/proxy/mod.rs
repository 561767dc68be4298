//! Proxy pipeline: upstream transport, body codec, span annotation,
//! failure classification and per-operation orchestration.

pub mod annotate;
pub mod client;
pub mod codec;
pub mod correlation;
pub mod error;
pub mod pipeline;
