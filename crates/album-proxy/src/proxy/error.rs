//! Failure classification for forwarded requests.

use std::fmt;

use http::StatusCode;

use super::client::UpstreamError;
use crate::model::ServerError;

/// Logical album operation. Names appear verbatim in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    GetAlbums,
    GetAlbumById,
    PostAlbum,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::GetAlbums => "getAlbums",
            Operation::GetAlbumById => "getAlbumById",
            Operation::PostAlbum => "postAlbum",
        }
    }

    /// Exported span name.
    pub fn span_name(&self) -> &'static str {
        match self {
            Operation::GetAlbums => "/albums GET",
            Operation::GetAlbumById => "/albums/:id GET",
            Operation::PostAlbum => "/albums POST",
        }
    }

    /// Upstream statuses treated as success. Reads accept only 200;
    /// creation also accepts 201.
    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            Operation::GetAlbums | Operation::GetAlbumById => status == StatusCode::OK,
            Operation::PostAlbum => status == StatusCode::OK || status == StatusCode::CREATED,
        }
    }

    /// Status returned to the caller on success.
    pub fn success_status(&self) -> StatusCode {
        match self {
            Operation::GetAlbums | Operation::GetAlbumById => StatusCode::OK,
            Operation::PostAlbum => StatusCode::CREATED,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every way a proxied request can fail. All variants are terminal.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("error invalid ID [{id}] requested")]
    InvalidId { id: String },

    #[error("invalid request json body {raw}")]
    InvalidRequestBody { raw: String },

    #[error("request body exceeds {limit} bytes")]
    RequestTooLarge { limit: usize },

    #[error("error reading request body {reason}")]
    RequestUnreadable { reason: String },

    #[error("error contacting album-store {op} {source}")]
    UpstreamTransport {
        op: Operation,
        #[source]
        source: UpstreamError,
    },

    #[error("album-store returned error {op}")]
    UpstreamStatus { op: Operation, status: StatusCode },

    #[error("error from album-store {op} malformed JSON")]
    UpstreamMalformed { op: Operation, raw: String },
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidId { .. }
            | ProxyError::InvalidRequestBody { .. }
            | ProxyError::RequestUnreadable { .. } => StatusCode::BAD_REQUEST,
            ProxyError::RequestTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UpstreamTransport { .. } | ProxyError::UpstreamMalformed { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::UpstreamStatus { status, .. } => *status,
        }
    }

    /// Client input errors never reach the upstream.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ProxyError::InvalidId { .. }
                | ProxyError::InvalidRequestBody { .. }
                | ProxyError::RequestTooLarge { .. }
                | ProxyError::RequestUnreadable { .. }
        )
    }

    pub fn envelope(&self) -> ServerError {
        ServerError::new(self.to_string())
    }
}
