//! # Norq Store
//!
//! Backing store for Norq queues: score-ordered indexes plus key-value
//! documents, with atomic multi-command batches.
//!
//! This library provides:
//! - The provider-agnostic [`Store`] capability trait
//! - A Redis provider for production use
//! - An in-memory provider for tests and development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all store operations
//! - [`store`] - The store trait, batch commands and replies
//! - [`provider`] - Provider types and configuration
//! - [`providers`] - Provider implementations

// Module declarations
pub mod error;
pub mod provider;
pub mod providers;
pub mod store;

// Re-export commonly used types at crate root for convenience
pub use error::{ConfigurationError, StoreError};
pub use provider::{ProviderType, RedisConfig, StoreConfig};
pub use providers::{InMemoryStore, RedisStore};
pub use store::{BatchOp, Reply, Score, Store};

use std::sync::Arc;

/// Factory for creating stores from configuration
pub struct StoreFactory;

impl StoreFactory {
    /// Create a store from configuration, connecting where required
    pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn Store>, StoreError> {
        match config {
            StoreConfig::Redis(redis) => Ok(Arc::new(RedisStore::connect(redis).await?)),
            StoreConfig::InMemory => Ok(Arc::new(InMemoryStore::new())),
        }
    }

    /// Create an empty in-memory store for tests
    pub fn create_test_store() -> Arc<dyn Store> {
        Arc::new(InMemoryStore::new())
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
