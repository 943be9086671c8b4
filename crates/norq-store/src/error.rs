//! Error types for backing store operations.

use thiserror::Error;

/// Error type for all backing store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Store command failed ({code}): {message}")]
    CommandFailed { code: String, message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl StoreError {
    /// Check if error is transient and the operation may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::WrongType { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::CommandFailed { .. } => false,
            Self::Configuration(_) => false,
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        if error.is_io_error() || error.is_connection_dropped() || error.is_timeout() {
            return Self::ConnectionFailed {
                message: error.to_string(),
            };
        }

        Self::CommandFailed {
            code: error.code().unwrap_or("ERR").to_string(),
            message: error.to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
