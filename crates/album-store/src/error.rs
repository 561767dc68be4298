//! Store request failures and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::model::{BindingError, ServerError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Album ID [{0}] is not a valid number")]
    InvalidId(String),

    #[error("Album [{0}] not found")]
    NotFound(i64),

    #[error("could not bind JSON posted to method")]
    Validation(Vec<BindingError>),

    #[error("{0}")]
    MalformedBody(String),
}

impl StoreError {
    /// Every store failure is reported as 400.
    pub fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    pub fn envelope(&self) -> ServerError {
        let errors = match self {
            StoreError::Validation(errors) => errors.clone(),
            _ => Vec::new(),
        };
        ServerError {
            message: self.to_string(),
            errors,
        }
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.envelope())).into_response()
    }
}
