use std::sync::Arc;

use serde_json::Value;

use crate::error::WebhookError;
use crate::schema::registry::SchemaRegistry;
use crate::schema::report::{ErrorReport, Violation};

/// Result of checking a decoded payload against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// The payload satisfies the schema. Carries the decoded value.
    Valid(Value),
    Invalid(ErrorReport),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationOutcome::Valid(_))
    }

    /// Converts an invalid outcome into [`WebhookError::SchemaInvalid`].
    pub fn into_result(self, schema: &str) -> Result<Value, WebhookError> {
        match self {
            ValidationOutcome::Valid(value) => Ok(value),
            ValidationOutcome::Invalid(report) => Err(WebhookError::SchemaInvalid {
                schema: schema.to_string(),
                report,
            }),
        }
    }
}

/// Validates payloads against schemas held by a shared [`SchemaRegistry`].
///
/// Pure: no logging, no state beyond the registry handle.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    registry: Arc<SchemaRegistry>,
}

impl SchemaValidator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Decodes `raw` and validates it against the schema named `schema`.
    ///
    /// Decoding happens before the schema lookup, so malformed input is
    /// reported as [`WebhookError::MalformedJson`] even when the schema is
    /// also missing.
    pub fn validate(&self, raw: &str, schema: &str) -> Result<ValidationOutcome, WebhookError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| WebhookError::MalformedJson(err.to_string()))?;
        self.validate_value(value, schema)
    }

    /// Validates an already decoded value. Collects every violation, not
    /// just the first.
    pub fn validate_value(
        &self,
        value: Value,
        schema: &str,
    ) -> Result<ValidationOutcome, WebhookError> {
        let document = self.registry.load(schema)?;
        let violations: Vec<Violation> = document
            .validator()
            .iter_errors(&value)
            .map(|err| Violation::from_error(&err))
            .collect();

        if violations.is_empty() {
            Ok(ValidationOutcome::Valid(value))
        } else {
            Ok(ValidationOutcome::Invalid(ErrorReport::new(violations)))
        }
    }
}
