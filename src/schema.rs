//! Declarative argument schemas.
//!
//! Methods may declare a JSON Schema for their argument. The decoded payload is
//! checked against it before the handler's typed argument is built, so
//! constraint violations surface as `schema_failure` instead of reaching the
//! handler.
//!
//! # Example
//!
//! ```
//! use rpcservice::schema::ArgumentSchema;
//! use serde_json::json;
//!
//! let schema = ArgumentSchema::new(json!({
//!     "type": "object",
//!     "properties": { "text": { "type": "string" } },
//!     "required": ["text"]
//! }))
//! .unwrap();
//!
//! assert!(schema.validate(&json!({"text": "hi"})).is_ok());
//! assert!(schema.validate(&json!({})).is_err());
//! ```

use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::error::RpcError;

/// Errors raised while compiling a schema at registration time.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// The schema document itself is not a valid JSON Schema.
    #[error("invalid argument schema: {message}")]
    Invalid { message: String },
}

/// One violated constraint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// `$`-prefixed JSON pointer to the offending value.
    pub path: String,
    pub message: String,
}

/// Compiled JSON Schema for a method argument.
pub struct ArgumentSchema {
    document: Value,
    validator: jsonschema::Validator,
}

impl ArgumentSchema {
    /// Compile `document`.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Invalid`] if the document is not a valid schema.
    pub fn new(document: Value) -> Result<Self, SchemaError> {
        let validator = jsonschema::options()
            .build(&document)
            .map_err(|e| SchemaError::Invalid {
                message: e.to_string(),
            })?;

        Ok(Self {
            document,
            validator,
        })
    }

    /// The schema document as declared.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Every violated constraint, ordered by path then message.
    pub fn violations(&self, value: &Value) -> Vec<Violation> {
        let mut violations: Vec<Violation> = self
            .validator
            .iter_errors(value)
            .map(|error| Violation {
                path: format!("${}", error.instance_path),
                message: error.to_string(),
            })
            .collect();
        violations.sort();
        violations
    }

    /// Validate a decoded argument.
    ///
    /// # Errors
    ///
    /// Returns a `schema_failure` error whose metadata names the first
    /// violation (`field`, `reason`) and the total count (`violations`).
    pub fn validate(&self, value: &Value) -> Result<(), RpcError> {
        if self.validator.is_valid(value) {
            return Ok(());
        }

        let violations = self.violations(value);
        let mut err = RpcError::schema_failure()
            .with_message("argument does not match the method schema")
            .with_meta("violations", violations.len());
        if let Some(first) = violations.into_iter().next() {
            err = err
                .with_meta("field", first.path)
                .with_meta("reason", first.message);
        }
        Err(err)
    }
}

impl fmt::Debug for ArgumentSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArgumentSchema")
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use serde_json::json;

    fn job_schema() -> ArgumentSchema {
        ArgumentSchema::new(json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "priority": { "type": "string", "enum": ["low", "high"] },
                "retries": { "type": "integer", "minimum": 0, "maximum": 5 }
            },
            "required": ["name", "priority"]
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_argument() {
        let schema = job_schema();
        assert!(schema
            .validate(&json!({"name": "build", "priority": "low", "retries": 2}))
            .is_ok());
    }

    #[test]
    fn test_missing_required_field() {
        let err = job_schema()
            .validate(&json!({"priority": "low"}))
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SchemaFailure);
        assert_eq!(err.metadata["field"], "$");
        assert_eq!(err.metadata["violations"], 1);
        assert!(err.metadata["reason"].as_str().unwrap().contains("name"));
    }

    #[test]
    fn test_enum_violation_points_at_field() {
        let err = job_schema()
            .validate(&json!({"name": "build", "priority": "urgent"}))
            .unwrap_err();
        assert_eq!(err.metadata["field"], "$/priority");
    }

    #[test]
    fn test_range_violation() {
        let err = job_schema()
            .validate(&json!({"name": "build", "priority": "high", "retries": 9}))
            .unwrap_err();
        assert_eq!(err.metadata["field"], "$/retries");
    }

    #[test]
    fn test_violations_are_deterministic() {
        let schema = job_schema();
        let value = json!({"priority": "urgent", "retries": -1});
        let first = schema.violations(&value);
        assert_eq!(first.len(), 3);
        assert_eq!(first, schema.violations(&value));
        assert_eq!(first[0].path, "$");
        assert_eq!(
            schema.validate(&value).unwrap_err(),
            schema.validate(&value).unwrap_err()
        );
    }

    #[test]
    fn test_invalid_schema_rejected() {
        let err = ArgumentSchema::new(json!({"type": "no-such-type"})).unwrap_err();
        assert!(matches!(err, SchemaError::Invalid { .. }));
    }
}
