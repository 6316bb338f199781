//! Error types produced by the webhook pipeline.
//!
//! Errors are split by who has to act on them:
//!
//! | Error | Category | Description |
//! |-------|----------|-------------|
//! | [`EmptyPayload`](WebhookError::EmptyPayload) | Input | Delivery carried zero bytes |
//! | [`MalformedJson`](WebhookError::MalformedJson) | Input | Body is not UTF-8 JSON |
//! | [`SchemaInvalid`](WebhookError::SchemaInvalid) | Input | Body violates the notification schema |
//! | [`SchemaNotFound`](WebhookError::SchemaNotFound) | Configuration | Named schema was never registered |
//! | [`Configuration`](WebhookError::Configuration) | Configuration | Empty secret or similar misconfiguration |
//! | [`Lookup`](WebhookError::Lookup) | Collaborator | Account backend failed |
//! | [`Effect`](WebhookError::Effect) | Collaborator | Applying the notification failed |
//!
//! Business rejections (wrong secret, unknown account) are not errors; they
//! are reported through [`Rejection`](crate::Rejection).

use thiserror::Error;

use crate::schema::ErrorReport;

/// Errors that stop a pipeline run.
///
/// All variants carry owned strings so the error stays cloneable and
/// comparable in tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum WebhookError {
    /// The delivery body was empty. Checked before any decode attempt.
    #[error("payload cannot be empty")]
    EmptyPayload,

    /// The body could not be decoded into a JSON value.
    #[error("malformed JSON payload: {0}")]
    MalformedJson(String),

    /// No schema is registered under the requested key.
    #[error("schema not found: {0}")]
    SchemaNotFound(String),

    /// The payload decoded but failed schema validation.
    #[error("{schema} failed to validate: {}", .report.terse())]
    SchemaInvalid { schema: String, report: ErrorReport },

    /// Operator-facing misconfiguration, e.g. an empty shared secret.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The account lookup collaborator failed.
    #[error("account lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// The effect collaborator failed after the account was resolved.
    #[error("applying notification failed: {0}")]
    Effect(#[from] EffectError),
}

impl WebhookError {
    /// Returns true for errors an operator must fix before deliveries can
    /// succeed at all.
    ///
    /// ```rust
    /// use iaptic_webhook::WebhookError;
    ///
    /// assert!(WebhookError::SchemaNotFound("iaptic-webhook".into()).is_configuration());
    /// assert!(!WebhookError::EmptyPayload.is_configuration());
    /// ```
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            WebhookError::SchemaNotFound(_) | WebhookError::Configuration(_)
        )
    }

    /// Short stable label used for metrics and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::EmptyPayload => "empty_payload",
            WebhookError::MalformedJson(_) => "malformed_json",
            WebhookError::SchemaNotFound(_) => "schema_not_found",
            WebhookError::SchemaInvalid { .. } => "schema_invalid",
            WebhookError::Configuration(_) => "configuration",
            WebhookError::Lookup(_) => "lookup_failed",
            WebhookError::Effect(_) => "effect_failed",
        }
    }
}

/// Failure reported by an [`AccountLookup`](crate::AccountLookup) backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct LookupError(pub String);

/// Failure reported by an [`EffectApplier`](crate::EffectApplier).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EffectError(pub String);
