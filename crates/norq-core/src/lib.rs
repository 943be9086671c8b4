//! # Norq Core
//!
//! Queue engine for Norq: named, ordered queues of JSON documents kept in a
//! backing store that offers sorted-set and key-value primitives.
//!
//! ## Architecture
//!
//! - The [`ModelRegistry`] declares which queues exist and compiles their
//!   JSON Schemas once
//! - The [`QueueEngine`] resolves a queue, validates input, and then talks
//!   to an injected [`norq_store::Store`]
//! - Every failure is a typed [`NorqError`] carrying a protocol-level name
//!
//! ## Usage
//!
//! ```rust
//! use norq_core::{ModelRegistry, QueueEngine};
//! use norq_store::StoreFactory;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), norq_core::NorqError> {
//! let engine = QueueEngine::new(ModelRegistry::default(), StoreFactory::create_test_store());
//!
//! let receipt = engine.push("default", json!({"task": "build"})).await?;
//! let next = engine.peek("default").await?;
//! assert!(next.is_some());
//! # let _ = receipt;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod engine;
pub mod error;
pub mod model;
pub mod validation;

pub use document::{Document, Payload, ID_FIELD};
pub use engine::{FlushOutcome, FlushTarget, PushReceipt, QueueEngine, ScoreClock, SetReceipt};
pub use error::{ModelError, NorqError, NorqResult};
pub use model::{ModelRegistry, QueueDefinition, QueueModel, DEFAULT_QUEUE, KEY_SEPARATOR};
pub use validation::{AcceptAll, DocumentValidator, JsonSchemaValidator, ValidationIssue};
