//! The backing-store capability used by the queue engine.
//!
//! A store combines two kinds of keys in one keyspace:
//! - **ordering indexes**: score-ordered sets of member ids, where equal
//!   scores are ordered lexicographically by member
//! - **values**: plain string values addressed by key
//!
//! Applying a primitive to a key holding the other kind of data fails with
//! [`StoreError::WrongType`] (or the provider's equivalent).

use crate::error::StoreError;
use crate::provider::ProviderType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;

/// Score attached to an ordering index member (milliseconds since the epoch)
pub type Score = i64;

/// A single sub-command of an atomic batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    /// Add `member` to the ordering index at `key` unless already present
    OrderedInsert {
        key: String,
        score: Score,
        member: String,
    },
    /// Remove `member` from the ordering index at `key`
    OrderedRemove { key: String, member: String },
    /// Write a value key
    ValueSet { key: String, value: String },
    /// Delete one or more keys
    ValueDelete { keys: Vec<String> },
}

impl BatchOp {
    /// Keys touched by this sub-command
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::OrderedInsert { key, .. }
            | Self::OrderedRemove { key, .. }
            | Self::ValueSet { key, .. } => vec![key.as_str()],
            Self::ValueDelete { keys } => keys.iter().map(String::as_str).collect(),
        }
    }
}

/// Raw reply of a single store command
///
/// Serialized untagged, so the replies of a push render as `[1, "OK"]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    /// Count of members or keys affected
    Integer(i64),
    /// Status line such as `OK`
    Status(String),
}

impl Reply {
    /// Status reply returned by successful value writes
    pub fn ok() -> Self {
        Self::Status("OK".to_string())
    }

    /// Integer payload of the reply, if it carries one
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Status(_) => None,
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Integer(value) => write!(f, "{}", value),
            Self::Status(status) => write!(f, "{}", status),
        }
    }
}

/// Interface implemented by backing store providers (Redis, in-memory)
#[async_trait]
pub trait Store: Send + Sync {
    /// Add `member` to an ordering index if absent; returns 1 when added
    async fn ordered_insert(
        &self,
        key: &str,
        score: Score,
        member: &str,
    ) -> Result<i64, StoreError>;

    /// Members between positional indices `start` and `end` inclusive,
    /// ascending. Negative indices count from the end.
    async fn ordered_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<String>, StoreError>;

    /// Number of members in an ordering index
    async fn ordered_cardinality(&self, key: &str) -> Result<u64, StoreError>;

    /// Remove `member` from an ordering index; returns the number removed
    async fn ordered_remove(&self, key: &str, member: &str) -> Result<i64, StoreError>;

    /// Write a value key
    async fn value_set(&self, key: &str, value: &str) -> Result<Reply, StoreError>;

    /// Read a value key
    async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Read several value keys, preserving order
    async fn value_multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Delete keys of any kind; returns the number of keys that existed
    async fn value_delete(&self, keys: &[String]) -> Result<i64, StoreError>;

    /// Apply all sub-commands as one indivisible unit. Replies are returned
    /// in submission order.
    async fn execute_atomic(&self, ops: Vec<BatchOp>) -> Result<Vec<Reply>, StoreError>;

    /// Remove every key of the selected database
    async fn flush_all(&self) -> Result<(), StoreError>;

    /// Verify the store is reachable
    async fn ping(&self) -> Result<(), StoreError>;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;
}
