//! Request ID generation for log and trace correlation.

use uuid::Uuid;

/// Header carrying the request ID back to the caller.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Generate a new request ID (UUID v4).
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}
