//! Error types for the HTTP service

use crate::config::ConfigError;
use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use norq_core::NorqError;
use serde_json::json;
use tracing::{error, warn};

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Message returned in place of server-side error details
const INTERNAL_ERROR_MESSAGE: &str = "Internal server error occurred. Please try again later.";

/// HTTP status for an engine error
///
/// Caller mistakes map to 4xx; anything raised by the backing store is a
/// server error.
pub fn status_for(error: &NorqError) -> StatusCode {
    match error {
        NorqError::DataNotObject
        | NorqError::InvalidId { .. }
        | NorqError::SchemaValidation { .. } => StatusCode::BAD_REQUEST,
        NorqError::QueueNotFound { .. } => StatusCode::NOT_FOUND,
        NorqError::InsertRejected { .. }
        | NorqError::CorruptDocument { .. }
        | NorqError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Request handler errors with HTTP status code mapping
///
/// Bodies are `{name, message}`. Schema violations carry the list of issues
/// as `message`. Server errors are logged in full but only a generic message
/// is returned to the client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Error raised by the queue engine
    #[error(transparent)]
    Engine(#[from] NorqError),

    /// A write request did not declare a JSON body
    ///
    /// Maps to: `400 Bad Request`
    #[error("Request Content-Type must be application/json.")]
    ContentTypeNotJson,

    /// No document is stored under the requested id
    ///
    /// Maps to: `404 Not Found`
    #[error("Item '{id}' not found in queue '{queue}'.")]
    ItemNotFound { queue: String, id: String },

    /// A path segment or query parameter could not be parsed
    ///
    /// Maps to: `400 Bad Request`
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidParameter {
            message: rejection.body_text(),
        }
    }
}

impl ApiError {
    /// Protocol-level name of the error
    pub fn name(&self) -> &'static str {
        match self {
            Self::Engine(e) => e.name(),
            Self::ContentTypeNotJson => "ContentTypeNotJson",
            Self::ItemNotFound { .. } => "ItemNotFound",
            Self::InvalidParameter { .. } => "InvalidParameter",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Engine(e) => status_for(e),
            Self::ContentTypeNotJson => StatusCode::BAD_REQUEST,
            Self::ItemNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InvalidParameter { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let name = self.name();

        let message = match &self {
            Self::Engine(NorqError::SchemaValidation { issues, .. }) => json!(issues),
            _ if status.is_server_error() => {
                let transient = matches!(&self, Self::Engine(e) if e.is_transient());
                error!(error = %self, name, transient, "Request failed with server error");
                json!(INTERNAL_ERROR_MESSAGE)
            }
            _ => {
                warn!(error = %self, name, status = %status, "Request rejected");
                json!(self.to_string())
            }
        };

        (status, Json(json!({ "name": name, "message": message }))).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}
