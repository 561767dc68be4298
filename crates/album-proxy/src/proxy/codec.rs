//! JSON body decoding that never loses the original bytes.

use bytes::Bytes;
use serde_json::Value;

/// A body that decoded as JSON, together with its raw text.
#[derive(Debug)]
pub struct DecodedBody {
    raw: String,
    value: Value,
}

impl DecodedBody {
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Re-serialize the decoded value.
    pub fn to_bytes(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(&self.value).map(Bytes::from)
    }
}

/// Malformed JSON. Keeps the raw text for diagnostics.
#[derive(Debug, thiserror::Error)]
#[error("malformed JSON: {source}")]
pub struct CodecError {
    raw: String,
    #[source]
    source: serde_json::Error,
}

impl CodecError {
    pub fn into_raw(self) -> String {
        self.raw
    }
}

/// Lossy UTF-8 view of a body, as recorded on spans and in messages.
pub fn raw_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

pub fn decode(bytes: &[u8]) -> Result<DecodedBody, CodecError> {
    let raw = raw_text(bytes);
    match serde_json::from_slice::<Value>(bytes) {
        Ok(value) => Ok(DecodedBody { raw, value }),
        Err(source) => Err(CodecError { raw, source }),
    }
}
