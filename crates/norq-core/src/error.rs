//! Error taxonomy produced by the queue engine.

use crate::validation::ValidationIssue;
use norq_store::{Reply, StoreError};
use thiserror::Error;

/// Standard result type for engine operations
pub type NorqResult<T> = Result<T, NorqError>;

/// Errors returned by queue engine operations
///
/// Every variant maps to one of the protocol-level names returned by
/// [`NorqError::name`]; the gateway translates those names into statuses.
#[derive(Debug, Error)]
pub enum NorqError {
    /// The queue is not defined in the model
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    /// The payload is not a JSON object, or not JSON at all
    #[error("Data must be an object.")]
    DataNotObject,

    /// The document `_id` is malformed or does not match the id argument
    #[error("Data must have an _id property that matches the id argument.")]
    InvalidId { id: String },

    /// The document violates the queue schema
    #[error("Document failed schema validation for queue '{queue_name}' ({} issue(s))", issues.len())]
    SchemaValidation {
        queue_name: String,
        issues: Vec<ValidationIssue>,
    },

    /// The ordering index refused a new member; carries the store's reply
    #[error("Ordering index rejected '{id}' in queue '{queue_name}' (reply: {reply})")]
    InsertRejected {
        queue_name: String,
        id: String,
        reply: Reply,
    },

    /// A stored value is not valid JSON
    #[error("Stored value at '{key}' is not valid JSON")]
    CorruptDocument { key: String },

    /// Failure surfaced verbatim from the backing store
    #[error("Backing store error: {0}")]
    Store(#[from] StoreError),
}

impl NorqError {
    /// Protocol-level name of the error kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::QueueNotFound { .. } => "QueueNotFound",
            Self::DataNotObject => "DataNotObject",
            Self::InvalidId { .. } => "InvalidId",
            Self::SchemaValidation { .. } => "SchemaValidationError",
            Self::InsertRejected { .. } | Self::CorruptDocument { .. } | Self::Store(_) => {
                "BackingStoreError"
            }
        }
    }

    /// Check if the error was caused by the caller's input rather than the store
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            Self::QueueNotFound { .. }
                | Self::DataNotObject
                | Self::InvalidId { .. }
                | Self::SchemaValidation { .. }
        )
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(error) => error.is_transient(),
            _ => false,
        }
    }
}

/// Errors raised while building the model registry
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Queue name is required")]
    EmptyName,

    #[error("Queue name '{name}' must not contain '{separator}'")]
    InvalidName { name: String, separator: char },

    #[error("Queue '{name}' is defined more than once")]
    DuplicateQueue { name: String },

    #[error("Schema for queue '{name}' is invalid: {message}")]
    InvalidSchema { name: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
