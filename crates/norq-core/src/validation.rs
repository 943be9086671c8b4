//! Document validation against queue schemas.
//!
//! Validation is a capability: the engine only sees [`DocumentValidator`].
//! Queues with a schema get a [`JsonSchemaValidator`]; queues without one
//! get [`AcceptAll`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;

/// A single violated schema constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// JSON pointer to the offending part of the document (`""` for the root)
    pub property: String,
    /// Human-readable description of the violation
    pub message: String,
    /// JSON pointer to the schema keyword that failed
    pub schema_path: String,
}

/// Interface for validating documents before they are written
pub trait DocumentValidator: Send + Sync {
    /// Validate a document, reporting every violation found
    fn validate(&self, document: &Value) -> Result<(), Vec<ValidationIssue>>;
}

/// Validator for queues without a schema
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

impl DocumentValidator for AcceptAll {
    fn validate(&self, _document: &Value) -> Result<(), Vec<ValidationIssue>> {
        Ok(())
    }
}

/// JSON Schema validator compiled once per queue
pub struct JsonSchemaValidator {
    validator: jsonschema::Validator,
}

impl JsonSchemaValidator {
    /// Compile a schema, returning the compiler's message on failure
    pub fn compile(schema: &Value) -> Result<Self, String> {
        let validator = jsonschema::validator_for(schema).map_err(|e| e.to_string())?;
        Ok(Self { validator })
    }
}

impl std::fmt::Debug for JsonSchemaValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonSchemaValidator").finish_non_exhaustive()
    }
}

impl DocumentValidator for JsonSchemaValidator {
    fn validate(&self, document: &Value) -> Result<(), Vec<ValidationIssue>> {
        let issues: Vec<ValidationIssue> = self
            .validator
            .iter_errors(document)
            .map(|error| ValidationIssue {
                property: error.instance_path.to_string(),
                message: error.to_string(),
                schema_path: error.schema_path.to_string(),
            })
            .collect();

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}
