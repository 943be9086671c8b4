//! The queue engine.
//!
//! A queue is stored as two structures in the backing store:
//! - an ordering index at key `{queue}` holding document ids scored by
//!   insertion time
//! - one value key per document at `{queue}:{id}` holding the serialized
//!   document
//!
//! Writes that touch both structures go through a single atomic batch.

use crate::document::{Document, DocumentId, Payload, ID_FIELD};
use crate::error::{NorqError, NorqResult};
use crate::model::{ModelRegistry, QueueDefinition, QueueModel};
use chrono::Utc;
use norq_store::{BatchOp, ProviderType, Reply, Score, Store, StoreError};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;

// ============================================================================
// Results
// ============================================================================

/// Result of a successful push
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PushReceipt {
    /// The document id, as stored in the document
    #[serde(rename = "_id")]
    pub id: Value,
    /// Raw replies of the ordering-index insert and the value write
    pub status: Vec<Reply>,
}

/// Result of a successful set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetReceipt {
    #[serde(rename = "_id")]
    pub id: String,
    pub status: Reply,
}

/// What a flush clears
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushTarget {
    /// Every key of the backing store
    All,
    /// One queue's index and documents
    Queue(String),
}

impl From<&str> for FlushTarget {
    fn from(target: &str) -> Self {
        if target == "all" {
            Self::All
        } else {
            Self::Queue(target.to_string())
        }
    }
}

/// Result of a flush
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FlushOutcome {
    All(bool),
    /// Number of document values deleted
    Queue(i64),
}

// ============================================================================
// Score Clock
// ============================================================================

/// Monotonic millisecond clock used to score ordering-index inserts
///
/// Scores follow the wall clock but never repeat or go backwards, so pushes
/// through one engine are strictly ordered even within a millisecond.
#[derive(Debug, Default)]
pub struct ScoreClock {
    last: AtomicI64,
}

impl ScoreClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next score for the current time
    pub fn next(&self) -> Score {
        self.next_after(Utc::now().timestamp_millis())
    }

    fn next_after(&self, now: Score) -> Score {
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or_else(|last| last);
        now.max(previous + 1)
    }
}

// ============================================================================
// Queue Engine
// ============================================================================

/// Queue operations over a model registry and a backing store
///
/// Every operation resolves its queue first and fails with
/// [`NorqError::QueueNotFound`] before touching the store.
#[derive(Clone)]
pub struct QueueEngine {
    registry: Arc<ModelRegistry>,
    store: Arc<dyn Store>,
    clock: Arc<ScoreClock>,
}

impl QueueEngine {
    pub fn new(registry: ModelRegistry, store: Arc<dyn Store>) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            clock: Arc::new(ScoreClock::new()),
        }
    }

    /// Engine sharing this engine's store and clock but serving another model
    pub fn with_registry(&self, registry: ModelRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Definition of a queue
    pub fn definition(&self, queue: &str) -> NorqResult<&QueueDefinition> {
        self.resolve(queue).map(QueueModel::definition)
    }

    /// Provider backing this engine
    pub fn provider_type(&self) -> ProviderType {
        self.store.provider_type()
    }

    /// Verify the backing store is reachable
    pub async fn ping(&self) -> NorqResult<()> {
        self.store
            .ping()
            .await
            .map_err(|e| store_failure("ping", "", e))
    }

    /// Append a document to the end of a queue
    #[instrument(skip(self, payload))]
    pub async fn push(&self, queue: &str, payload: impl Into<Payload>) -> NorqResult<PushReceipt> {
        let model = self.resolve(queue)?;
        let mut document = parse(model, payload.into())?;
        validate(model, &document)?;

        let id = match DocumentId::of(&document) {
            DocumentId::Present(id) => id,
            DocumentId::Absent => {
                let id = Uuid::new_v4().to_string();
                if let Value::Object(fields) = &mut document {
                    fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                }
                id
            }
            DocumentId::Unsupported => {
                let id = document[ID_FIELD].to_string();
                warn!(queue, id = %id, "Rejected push with unsupported _id type");
                return Err(NorqError::InvalidId { id });
            }
        };

        let key = model.item_key(&id);
        let serialized = serialize(&document)?;
        let replies = self
            .store
            .execute_atomic(vec![
                BatchOp::OrderedInsert {
                    key: model.index_key().to_string(),
                    score: self.clock.next(),
                    member: id.clone(),
                },
                BatchOp::ValueSet {
                    key: key.clone(),
                    value: serialized,
                },
            ])
            .await
            .map_err(|e| store_failure("push", queue, e))?;

        let insert_reply = replies.first().cloned().unwrap_or(Reply::Integer(0));
        if insert_reply.as_integer() != Some(1) {
            warn!(
                queue,
                id = %id,
                reply = %insert_reply,
                "Ordering index rejected document, rolling back value"
            );
            // Not atomic with the batch above; a failure here orphans the value
            if let Err(e) = self.store.value_delete(&[key.clone()]).await {
                error!(queue, key = %key, error = %e, "Failed to roll back rejected push");
            }
            return Err(NorqError::InsertRejected {
                queue_name: queue.to_string(),
                id,
                reply: insert_reply,
            });
        }

        debug!(queue, id = %id, "Pushed document");
        Ok(PushReceipt {
            id: document.get(ID_FIELD).cloned().unwrap_or(Value::Null),
            status: replies,
        })
    }

    /// The oldest document of a queue, without removing it
    #[instrument(skip(self))]
    pub async fn peek(&self, queue: &str) -> NorqResult<Option<Document>> {
        let model = self.resolve(queue)?;
        match self.first_id(model).await? {
            Some(id) => self.fetch(model, &id).await,
            None => Ok(None),
        }
    }

    /// Remove and return the oldest document of a queue
    #[instrument(skip(self))]
    pub async fn pop(&self, queue: &str) -> NorqResult<Option<Document>> {
        let model = self.resolve(queue)?;
        let Some(id) = self.first_id(model).await? else {
            return Ok(None);
        };

        let document = self.fetch(model, &id).await?;
        self.remove_item(model, &id).await?;

        debug!(queue, id = %id, "Popped document");
        Ok(document)
    }

    /// Number of documents in a queue
    #[instrument(skip(self))]
    pub async fn size(&self, queue: &str) -> NorqResult<u64> {
        let model = self.resolve(queue)?;
        self.store
            .ordered_cardinality(model.index_key())
            .await
            .map_err(|e| store_failure("size", queue, e))
    }

    /// Documents between positions `start` and `end` inclusive, oldest first
    ///
    /// Negative positions count from the end of the queue.
    #[instrument(skip(self))]
    pub async fn range(&self, queue: &str, start: i64, end: i64) -> NorqResult<Vec<Document>> {
        let model = self.resolve(queue)?;
        self.window(model, start, end).await
    }

    /// The first `count` documents
    #[instrument(skip(self))]
    pub async fn head(&self, queue: &str, count: u64) -> NorqResult<Vec<Document>> {
        let model = self.resolve(queue)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        self.window(model, 0, to_position(count) - 1).await
    }

    /// The last `count` documents, newest first
    #[instrument(skip(self))]
    pub async fn tail(&self, queue: &str, count: u64) -> NorqResult<Vec<Document>> {
        let model = self.resolve(queue)?;
        if count == 0 {
            return Ok(Vec::new());
        }

        let size = self
            .store
            .ordered_cardinality(model.index_key())
            .await
            .map_err(|e| store_failure("tail", queue, e))?;
        if size == 0 {
            return Ok(Vec::new());
        }

        let start = to_position(size.saturating_sub(count));
        let mut documents = self.window(model, start, -1).await?;
        documents.reverse();
        Ok(documents)
    }

    /// One page of documents; pages are numbered from 1
    #[instrument(skip(self))]
    pub async fn page(&self, queue: &str, page: u64, page_size: u64) -> NorqResult<Vec<Document>> {
        let model = self.resolve(queue)?;
        if page == 0 || page_size == 0 {
            return Ok(Vec::new());
        }

        let Some(start) = (page - 1)
            .checked_mul(page_size)
            .and_then(|start| i64::try_from(start).ok())
        else {
            return Ok(Vec::new());
        };
        let end = page
            .checked_mul(page_size)
            .map(|end| to_position(end) - 1)
            .unwrap_or(i64::MAX);

        self.window(model, start, end).await
    }

    /// A document by id
    ///
    /// Reads the value key directly; the id need not be in the ordering index.
    #[instrument(skip(self))]
    pub async fn get(&self, queue: &str, id: &str) -> NorqResult<Option<Document>> {
        let model = self.resolve(queue)?;
        self.fetch(model, id).await
    }

    /// Overwrite a document in place without changing its position
    ///
    /// The document's `_id` must match `id` in its key form, so a numeric
    /// `_id` of `5` matches the id `"5"`.
    #[instrument(skip(self, payload))]
    pub async fn set(
        &self,
        queue: &str,
        id: &str,
        payload: impl Into<Payload>,
    ) -> NorqResult<SetReceipt> {
        let model = self.resolve(queue)?;
        let document = parse(model, payload.into())?;
        validate(model, &document)?;

        match DocumentId::of(&document) {
            DocumentId::Present(document_id) if document_id == id => {}
            _ => {
                warn!(queue, id, "Rejected set with missing or mismatched _id");
                return Err(NorqError::InvalidId { id: id.to_string() });
            }
        }

        let status = self
            .store
            .value_set(&model.item_key(id), &serialize(&document)?)
            .await
            .map_err(|e| store_failure("set", queue, e))?;

        debug!(queue, id, "Updated document");
        Ok(SetReceipt {
            id: id.to_string(),
            status,
        })
    }

    /// Remove a document; removing an absent id is not an error
    #[instrument(skip(self))]
    pub async fn remove(&self, queue: &str, id: &str) -> NorqResult<Vec<Reply>> {
        let model = self.resolve(queue)?;
        let replies = self.remove_item(model, id).await?;
        debug!(queue, id, replies = ?replies, "Removed document");
        Ok(replies)
    }

    /// Clear a single queue or the whole backing store
    #[instrument(skip(self))]
    pub async fn flush(&self, target: FlushTarget) -> NorqResult<FlushOutcome> {
        match target {
            FlushTarget::All => {
                self.store
                    .flush_all()
                    .await
                    .map_err(|e| store_failure("flush", "all", e))?;
                warn!("Flushed entire backing store");
                Ok(FlushOutcome::All(true))
            }
            FlushTarget::Queue(queue) => {
                let model = self.resolve(&queue)?;
                let ids = self
                    .store
                    .ordered_range(model.index_key(), 0, -1)
                    .await
                    .map_err(|e| store_failure("flush", &queue, e))?;

                let keys: Vec<String> = ids.iter().map(|id| model.item_key(id)).collect();
                let deleted = self
                    .store
                    .value_delete(&keys)
                    .await
                    .map_err(|e| store_failure("flush", &queue, e))?;
                self.store
                    .value_delete(&[model.index_key().to_string()])
                    .await
                    .map_err(|e| store_failure("flush", &queue, e))?;

                warn!(queue = %queue, deleted, "Flushed queue");
                Ok(FlushOutcome::Queue(deleted))
            }
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn resolve(&self, queue: &str) -> NorqResult<&QueueModel> {
        self.registry.resolve(queue).inspect_err(|_| {
            warn!(queue, "Queue not found");
        })
    }

    async fn first_id(&self, model: &QueueModel) -> NorqResult<Option<String>> {
        let ids = self
            .store
            .ordered_range(model.index_key(), 0, 0)
            .await
            .map_err(|e| store_failure("first_id", model.name(), e))?;
        Ok(ids.into_iter().next())
    }

    async fn fetch(&self, model: &QueueModel, id: &str) -> NorqResult<Option<Document>> {
        let key = model.item_key(id);
        let value = self
            .store
            .value_get(&key)
            .await
            .map_err(|e| store_failure("get", model.name(), e))?;

        value.map(|raw| Document::from_stored(&key, raw)).transpose()
    }

    async fn remove_item(&self, model: &QueueModel, id: &str) -> NorqResult<Vec<Reply>> {
        self.store
            .execute_atomic(vec![
                BatchOp::OrderedRemove {
                    key: model.index_key().to_string(),
                    member: id.to_string(),
                },
                BatchOp::ValueDelete {
                    keys: vec![model.item_key(id)],
                },
            ])
            .await
            .map_err(|e| store_failure("remove", model.name(), e))
    }

    async fn window(&self, model: &QueueModel, start: i64, end: i64) -> NorqResult<Vec<Document>> {
        let ids = self
            .store
            .ordered_range(model.index_key(), start, end)
            .await
            .map_err(|e| store_failure("range", model.name(), e))?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| model.item_key(id)).collect();
        let values = self
            .store
            .value_multi_get(&keys)
            .await
            .map_err(|e| store_failure("range", model.name(), e))?;

        let mut documents = Vec::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            match value {
                Some(raw) => documents.push(Document::from_stored(key, raw)?),
                None => warn!(
                    queue = model.name(),
                    key = %key,
                    "Skipping indexed id with no stored document"
                ),
            }
        }
        Ok(documents)
    }
}

impl std::fmt::Debug for QueueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueEngine")
            .field("registry", &self.registry)
            .field("provider", &self.provider_type())
            .finish()
    }
}

fn parse(model: &QueueModel, payload: Payload) -> NorqResult<Value> {
    payload.into_document().inspect_err(|_| {
        warn!(queue = model.name(), "Rejected payload that is not a JSON object");
    })
}

fn validate(model: &QueueModel, document: &Value) -> NorqResult<()> {
    model.validate(document).map_err(|issues| {
        warn!(
            queue = model.name(),
            issues = issues.len(),
            "Document failed schema validation"
        );
        NorqError::SchemaValidation {
            queue_name: model.name().to_string(),
            issues,
        }
    })
}

fn serialize(document: &Value) -> NorqResult<String> {
    serde_json::to_string(document).map_err(|_| NorqError::DataNotObject)
}

fn store_failure(operation: &str, queue: &str, error: StoreError) -> NorqError {
    error!(operation, queue, error = %error, "Backing store operation failed");
    NorqError::Store(error)
}

/// Convert a count to a store position, saturating at the largest position
fn to_position(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}
