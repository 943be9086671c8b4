//! Queue model: the set of queues an engine serves and their schemas.

use crate::error::{ModelError, NorqError, NorqResult};
use crate::validation::{AcceptAll, DocumentValidator, JsonSchemaValidator, ValidationIssue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;

/// Separator between queue name and document id in value keys
pub const KEY_SEPARATOR: char = ':';

/// Name of the queue defined when no model is configured
pub const DEFAULT_QUEUE: &str = "default";

/// Definition of a single queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

impl QueueDefinition {
    /// Create a queue definition without a schema
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
        }
    }

    /// Attach a JSON Schema to the definition
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

/// A resolved queue: its definition plus the compiled validator
#[derive(Clone)]
pub struct QueueModel {
    definition: QueueDefinition,
    validator: Arc<dyn DocumentValidator>,
}

impl QueueModel {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &QueueDefinition {
        &self.definition
    }

    /// Validate a document against this queue's schema
    pub fn validate(&self, document: &Value) -> Result<(), Vec<ValidationIssue>> {
        self.validator.validate(document)
    }

    /// Key of the ordering index for this queue
    pub fn index_key(&self) -> &str {
        &self.definition.name
    }

    /// Value key for a document of this queue
    pub fn item_key(&self, id: &str) -> String {
        format!("{}{}{}", self.definition.name, KEY_SEPARATOR, id)
    }
}

impl std::fmt::Debug for QueueModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueModel")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Immutable mapping from queue name to queue model
///
/// Schemas are compiled once, when the registry is built.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    queues: BTreeMap<String, QueueModel>,
}

impl ModelRegistry {
    /// Build a registry, compiling every schema
    pub fn new(definitions: impl IntoIterator<Item = QueueDefinition>) -> Result<Self, ModelError> {
        let mut queues = BTreeMap::new();

        for definition in definitions {
            validate_name(&definition.name)?;
            if queues.contains_key(&definition.name) {
                return Err(ModelError::DuplicateQueue {
                    name: definition.name,
                });
            }

            let validator: Arc<dyn DocumentValidator> = match &definition.schema {
                Some(schema) => Arc::new(JsonSchemaValidator::compile(schema).map_err(
                    |message| ModelError::InvalidSchema {
                        name: definition.name.clone(),
                        message,
                    },
                )?),
                None => Arc::new(AcceptAll),
            };

            queues.insert(
                definition.name.clone(),
                QueueModel {
                    definition,
                    validator,
                },
            );
        }

        Ok(Self { queues })
    }

    /// Resolve a queue by name
    pub fn resolve(&self, name: &str) -> NorqResult<&QueueModel> {
        self.queues.get(name).ok_or_else(|| NorqError::QueueNotFound {
            queue_name: name.to_string(),
        })
    }

    /// All queue definitions, ordered by name
    pub fn definitions(&self) -> Vec<&QueueDefinition> {
        self.queues.values().map(QueueModel::definition).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

impl Default for ModelRegistry {
    /// A registry holding the single schemaless `default` queue
    fn default() -> Self {
        let definition = QueueDefinition::new(DEFAULT_QUEUE);
        let mut queues = BTreeMap::new();
        queues.insert(
            definition.name.clone(),
            QueueModel {
                definition,
                validator: Arc::new(AcceptAll),
            },
        );
        Self { queues }
    }
}

fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.trim().is_empty() {
        return Err(ModelError::EmptyName);
    }
    if name.contains(KEY_SEPARATOR) {
        return Err(ModelError::InvalidName {
            name: name.to_string(),
            separator: KEY_SEPARATOR,
        });
    }
    Ok(())
}
