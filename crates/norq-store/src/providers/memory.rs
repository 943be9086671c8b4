//! In-memory store provider implementation for testing and development.
//!
//! This module provides a process-local keyspace that mirrors the parts of
//! Redis the queue engine relies on:
//! - Sorted-set ordering indexes with insert-if-absent semantics
//! - Inclusive positional windows with negative indices counting from the end
//! - Typed keys (ordering index vs. value) with wrong-type errors
//! - All-or-nothing atomic batches
//!
//! This provider is intended for:
//! - Unit and router tests of the queue engine
//! - Local development without a Redis server

use crate::error::StoreError;
use crate::provider::ProviderType;
use crate::store::{BatchOp, Reply, Score, Store};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Kind of data held by a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Value,
    Ordered,
}

/// Data held by a single key
enum Entry {
    Value(String),
    Ordered(OrderedIndex),
}

impl Entry {
    fn kind(&self) -> KeyKind {
        match self {
            Self::Value(_) => KeyKind::Value,
            Self::Ordered(_) => KeyKind::Ordered,
        }
    }
}

/// Score-ordered member set; equal scores order by member
#[derive(Default)]
struct OrderedIndex {
    scores: HashMap<String, Score>,
    order: BTreeSet<(Score, String)>,
}

impl OrderedIndex {
    fn insert(&mut self, score: Score, member: &str) -> i64 {
        if self.scores.contains_key(member) {
            return 0;
        }
        self.scores.insert(member.to_string(), score);
        self.order.insert((score, member.to_string()));
        1
    }

    fn remove(&mut self, member: &str) -> i64 {
        match self.scores.remove(member) {
            Some(score) => {
                self.order.remove(&(score, member.to_string()));
                1
            }
            None => 0,
        }
    }

    fn len(&self) -> usize {
        self.scores.len()
    }

    fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    fn range(&self, start: i64, end: i64) -> Vec<String> {
        match window(self.len(), start, end) {
            Some((first, last)) => self
                .order
                .iter()
                .skip(first)
                .take(last - first + 1)
                .map(|(_, member)| member.clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Resolve inclusive positional indices against a collection of `len`
/// elements. Negative indices count from the end; out-of-range bounds are
/// clamped and an empty window yields `None`.
fn window(len: usize, start: i64, end: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let mut start = if start < 0 { start + len } else { start };
    let mut end = if end < 0 { end + len } else { end };

    if start < 0 {
        start = 0;
    }
    if end >= len {
        end = len - 1;
    }
    if start > end || start >= len {
        return None;
    }

    Some((start as usize, end as usize))
}

/// The whole keyspace of one in-memory store
#[derive(Default)]
struct Keyspace {
    entries: HashMap<String, Entry>,
}

impl Keyspace {
    fn kind(&self, key: &str) -> Option<KeyKind> {
        self.entries.get(key).map(Entry::kind)
    }

    fn ordered(&self, key: &str) -> Result<Option<&OrderedIndex>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Ordered(index)) => Ok(Some(index)),
            Some(Entry::Value(_)) => Err(wrong_type(key)),
        }
    }

    fn value(&self, key: &str) -> Result<Option<&str>, StoreError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(Entry::Value(value)) => Ok(Some(value.as_str())),
            Some(Entry::Ordered(_)) => Err(wrong_type(key)),
        }
    }

    fn ordered_insert(&mut self, key: &str, score: Score, member: &str) -> Result<i64, StoreError> {
        let entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::Ordered(OrderedIndex::default()));

        match entry {
            Entry::Ordered(index) => Ok(index.insert(score, member)),
            Entry::Value(_) => Err(wrong_type(key)),
        }
    }

    fn ordered_remove(&mut self, key: &str, member: &str) -> Result<i64, StoreError> {
        let (removed, now_empty) = match self.entries.get_mut(key) {
            None => return Ok(0),
            Some(Entry::Value(_)) => return Err(wrong_type(key)),
            Some(Entry::Ordered(index)) => {
                let removed = index.remove(member);
                (removed, index.is_empty())
            }
        };

        // An ordering index disappears with its last member
        if now_empty {
            self.entries.remove(key);
        }
        Ok(removed)
    }

    fn value_set(&mut self, key: &str, value: &str) -> Reply {
        self.entries
            .insert(key.to_string(), Entry::Value(value.to_string()));
        Reply::ok()
    }

    fn delete(&mut self, keys: &[String]) -> i64 {
        keys.iter()
            .filter(|key| self.entries.remove(key.as_str()).is_some())
            .count() as i64
    }

    /// Verify every sub-command of a batch would succeed, taking the effect
    /// of earlier sub-commands on key kinds into account.
    fn check_batch(&self, ops: &[BatchOp]) -> Result<(), StoreError> {
        let mut pending: HashMap<&str, Option<KeyKind>> = HashMap::new();

        for op in ops {
            match op {
                BatchOp::OrderedInsert { key, .. } | BatchOp::OrderedRemove { key, .. } => {
                    let kind = pending
                        .get(key.as_str())
                        .copied()
                        .unwrap_or_else(|| self.kind(key));
                    if kind == Some(KeyKind::Value) {
                        return Err(wrong_type(key));
                    }
                    if matches!(op, BatchOp::OrderedInsert { .. }) {
                        pending.insert(key.as_str(), Some(KeyKind::Ordered));
                    }
                }
                BatchOp::ValueSet { key, .. } => {
                    pending.insert(key.as_str(), Some(KeyKind::Value));
                }
                BatchOp::ValueDelete { .. } => {
                    for key in op.keys() {
                        pending.insert(key, None);
                    }
                }
            }
        }

        Ok(())
    }

    fn apply(&mut self, op: &BatchOp) -> Result<Reply, StoreError> {
        match op {
            BatchOp::OrderedInsert { key, score, member } => {
                self.ordered_insert(key, *score, member).map(Reply::Integer)
            }
            BatchOp::OrderedRemove { key, member } => {
                self.ordered_remove(key, member).map(Reply::Integer)
            }
            BatchOp::ValueSet { key, value } => Ok(self.value_set(key, value)),
            BatchOp::ValueDelete { keys } => Ok(Reply::Integer(self.delete(keys))),
        }
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

// ============================================================================
// InMemoryStore
// ============================================================================

/// In-memory store provider implementation
///
/// Clones share the same keyspace.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    keyspace: Arc<RwLock<Keyspace>>,
}

impl InMemoryStore {
    /// Create a new, empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub async fn key_count(&self) -> usize {
        self.keyspace.read().await.entries.len()
    }

    /// Check whether a key of any kind exists
    pub async fn contains_key(&self, key: &str) -> bool {
        self.keyspace.read().await.entries.contains_key(key)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn ordered_insert(
        &self,
        key: &str,
        score: Score,
        member: &str,
    ) -> Result<i64, StoreError> {
        self.keyspace
            .write()
            .await
            .ordered_insert(key, score, member)
    }

    async fn ordered_range(
        &self,
        key: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<String>, StoreError> {
        let keyspace = self.keyspace.read().await;
        Ok(keyspace
            .ordered(key)?
            .map(|index| index.range(start, end))
            .unwrap_or_default())
    }

    async fn ordered_cardinality(&self, key: &str) -> Result<u64, StoreError> {
        let keyspace = self.keyspace.read().await;
        Ok(keyspace
            .ordered(key)?
            .map(|index| index.len() as u64)
            .unwrap_or(0))
    }

    async fn ordered_remove(&self, key: &str, member: &str) -> Result<i64, StoreError> {
        self.keyspace.write().await.ordered_remove(key, member)
    }

    async fn value_set(&self, key: &str, value: &str) -> Result<Reply, StoreError> {
        Ok(self.keyspace.write().await.value_set(key, value))
    }

    async fn value_get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let keyspace = self.keyspace.read().await;
        Ok(keyspace.value(key)?.map(str::to_string))
    }

    async fn value_multi_get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let keyspace = self.keyspace.read().await;
        // MGET reports keys of another kind as missing rather than failing
        Ok(keys
            .iter()
            .map(|key| keyspace.value(key).ok().flatten().map(str::to_string))
            .collect())
    }

    async fn value_delete(&self, keys: &[String]) -> Result<i64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        Ok(self.keyspace.write().await.delete(keys))
    }

    async fn execute_atomic(&self, ops: Vec<BatchOp>) -> Result<Vec<Reply>, StoreError> {
        let mut keyspace = self.keyspace.write().await;
        keyspace.check_batch(&ops)?;

        let replies = ops
            .iter()
            .map(|op| keyspace.apply(op))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(commands = ops.len(), "Applied atomic batch");
        Ok(replies)
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.keyspace.write().await.entries.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }
}
