//! Wire type shared by every error response.

use serde::{Deserialize, Serialize};

/// The `{"message": ...}` error envelope.
///
/// album-store bodies are passed through as raw bytes, so the proxy never
/// builds or parses its `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    pub message: String,
}

impl ServerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // A single string field; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"message":"{}"}}"#, self.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_escapes_message() {
        let err = ServerError::new("invalid request json body {\"title\"");
        assert_eq!(err.to_json(), r#"{"message":"invalid request json body {\"title\""}"#);
    }

    #[test]
    fn test_store_envelope_with_errors_reads_message() {
        let json = r#"{"message":"invalid album","errors":[{"field":"title","message":"required field"}]}"#;
        let err: ServerError = serde_json::from_str(json).unwrap();
        assert_eq!(err, ServerError::new("invalid album"));
        assert_eq!(err.to_json(), r#"{"message":"invalid album"}"#);
    }
}
