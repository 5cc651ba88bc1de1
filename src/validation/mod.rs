//! Structural validation of build documents
//!
//! Schemas are JSON Schema documents compiled once with `jsonschema` (draft
//! detected from `$schema`, 2020-12 otherwise). `format` is asserted, not just
//! annotated. A compiled `BuildSchema` is only ever read, so one instance can be
//! shared by every ingestion path.

use jsonschema::Validator;
use serde_json::Value;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Schema shipped with the crate, describing Buildhub build documents
const BUILTIN_SCHEMA: &str = include_str!("build_schema.json");

/// Errors produced while loading a schema or validating a document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The document does not satisfy the schema
    #[error("Schema violation at {path}: {message}")]
    SchemaViolation { path: String, message: String },

    /// The schema itself could not be loaded or compiled
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

impl ValidationError {
    fn violation(path: &str, message: impl Into<String>) -> Self {
        Self::SchemaViolation {
            path: if path.is_empty() { "/".to_string() } else { path.to_string() },
            message: message.into(),
        }
    }
}

impl From<jsonschema::ValidationError<'_>> for ValidationError {
    fn from(err: jsonschema::ValidationError<'_>) -> Self {
        Self::violation(&err.instance_path.to_string(), err.to_string())
    }
}

/// Validation schema for build documents
///
/// Load once at startup and share (`Arc<BuildSchema>`); it is never mutated.
pub struct BuildSchema {
    schema: Value,
    validator: Validator,
}

impl fmt::Debug for BuildSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildSchema")
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl BuildSchema {
    /// Compile a schema from its JSON representation
    ///
    /// Fails with [`ValidationError::InvalidSchema`] when the schema is not a
    /// valid JSON Schema or references something that cannot be resolved.
    pub fn from_value(schema: Value) -> Result<Self, ValidationError> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(&schema)
            .map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;
        Ok(Self { schema, validator })
    }

    /// Compile a schema from JSON text
    pub fn from_json_str(schema: &str) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_str(schema)
            .map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;
        Self::from_value(value)
    }

    /// Load a schema file
    pub fn load(path: &Path) -> Result<Self, ValidationError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::InvalidSchema(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&text)
    }

    /// The schema bundled with the crate
    pub fn builtin() -> Result<Self, ValidationError> {
        Self::from_json_str(BUILTIN_SCHEMA)
    }

    /// The schema document this validator was compiled from
    pub fn as_value(&self) -> &Value {
        &self.schema
    }

    /// Check a document against this schema, reporting the first violation
    pub fn validate(&self, document: &Value) -> Result<(), ValidationError> {
        self.validator.validate(document).map_err(ValidationError::from)
    }
}

/// Validate `document` against `schema`
pub fn validate(document: &Value, schema: &BuildSchema) -> Result<(), ValidationError> {
    schema.validate(document)
}
