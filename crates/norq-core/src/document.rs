//! Payloads accepted by the engine and documents returned from it.

use crate::error::{NorqError, NorqResult};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

#[cfg(test)]
#[path = "document_tests.rs"]
mod tests;

/// Property holding a document's identifier
pub const ID_FIELD: &str = "_id";

/// Data handed to a write operation
///
/// Text payloads are parsed by the engine after the queue is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    /// Parse the payload, accepting only JSON objects
    pub(crate) fn into_document(self) -> NorqResult<Value> {
        let value = match self {
            Self::Text(text) => {
                serde_json::from_str::<Value>(&text).map_err(|_| NorqError::DataNotObject)?
            }
            Self::Json(value) => value,
        };

        if value.is_object() {
            Ok(value)
        } else {
            Err(NorqError::DataNotObject)
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// State of the `_id` property of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DocumentId {
    /// Missing, `null` or the empty string
    Absent,
    /// Present; holds the form used in value keys
    Present(String),
    /// Present but neither a string nor a number
    Unsupported,
}

impl DocumentId {
    pub(crate) fn of(document: &Value) -> Self {
        match document.get(ID_FIELD) {
            None | Some(Value::Null) => Self::Absent,
            Some(Value::String(id)) if id.is_empty() => Self::Absent,
            Some(Value::String(id)) => Self::Present(id.clone()),
            Some(Value::Number(id)) => Self::Present(id.to_string()),
            Some(_) => Self::Unsupported,
        }
    }
}

/// A stored document, returned exactly as it was written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Box<RawValue>);

impl Document {
    /// Wrap a stored value; `key` is reported if the value is not JSON
    pub fn from_stored(key: &str, raw: String) -> NorqResult<Self> {
        RawValue::from_string(raw)
            .map(Self)
            .map_err(|_| NorqError::CorruptDocument {
                key: key.to_string(),
            })
    }

    /// The serialized document
    pub fn as_str(&self) -> &str {
        self.0.get()
    }

    /// Parse the document into a JSON value
    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::from_str(self.0.get())
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
