//! The validation-and-dispatch pipeline.
//!
//! ```text
//! Received ──non-empty──▶ Decoded ──schema ok──▶ SchemaValid ──secret ok──▶ Authenticated
//!    │                       │                        │                         │
//!    ▼                       ▼                        ▼                         ▼
//! EmptyPayload        MalformedJson /            BadSecret            NoIdentifier / AccountNotFound
//! (error)             SchemaInvalid (error)      (soft stop)          (soft stop)
//!
//! Authenticated ──account found──▶ AccountResolved ──effect──▶ Applied
//! ```
//!
//! Errors ([`WebhookError`]) are precondition or collaborator failures.
//! Soft stops come back as [`Outcome::Rejected`] and are logged at warning
//! level here; the endpoint acknowledges both the same way.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::account::{AccountHandle, AccountResolver, Resolution};
use crate::auth::SecretAuthenticator;
use crate::error::{EffectError, WebhookError};
use crate::schema::{SchemaValidator, ValidationOutcome};

/// Member carrying the claimed shared secret.
pub const SECRET_FIELD: &str = "password";

/// Member carrying the external account identifier.
pub const IDENTIFIER_FIELD: &str = "applicationUsername";

/// Schema notifications are checked against unless configured otherwise.
pub const DEFAULT_SCHEMA: &str = "iaptic-webhook";

const REDACTED: &str = "[redacted]";

/// Characters of an undecodable body kept in the rejection log.
const BODY_PREVIEW_CHARS: usize = 256;

/// Side effect run once a notification is matched to an account.
///
/// Deliveries are at-least-once, so implementations must tolerate seeing the
/// same notification twice.
#[async_trait]
pub trait EffectApplier: Send + Sync {
    async fn apply(&self, account: &AccountHandle, notification: &Value)
    -> Result<(), EffectError>;
}

/// Pipeline states, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Received,
    Decoded,
    SchemaValid,
    Authenticated,
    AccountResolved,
    Applied,
}

/// Business-level reasons a valid notification was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    BadSecret,
    NoIdentifier,
    AccountNotFound { identifier: String },
}

impl Rejection {
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::BadSecret => "bad_secret",
            Rejection::NoIdentifier => "no_identifier",
            Rejection::AccountNotFound { .. } => "account_not_found",
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BadSecret => f.write_str("shared secret missing or wrong"),
            Rejection::NoIdentifier => f.write_str("notification has no applicationUsername"),
            Rejection::AccountNotFound { identifier } => {
                write!(f, "no account for identifier {identifier}")
            }
        }
    }
}

/// How a pipeline run that did not error ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied { account: AccountHandle },
    Rejected(Rejection),
}

impl Outcome {
    /// Last state the run reached.
    pub fn stage(&self) -> Stage {
        match self {
            Outcome::Applied { .. } => Stage::Applied,
            Outcome::Rejected(Rejection::BadSecret) => Stage::SchemaValid,
            Outcome::Rejected(_) => Stage::Authenticated,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Applied { .. } => "applied",
            Outcome::Rejected(rejection) => rejection.label(),
        }
    }
}

/// Orchestrates decode, validation, authentication, resolution and effect.
///
/// Holds no per-delivery state; one instance serves concurrent deliveries.
#[derive(Clone)]
pub struct WebhookProcessor {
    validator: SchemaValidator,
    schema: String,
    authenticator: SecretAuthenticator,
    resolver: AccountResolver,
    effect: Arc<dyn EffectApplier>,
}

impl WebhookProcessor {
    pub fn new(
        validator: SchemaValidator,
        authenticator: SecretAuthenticator,
        resolver: AccountResolver,
        effect: Arc<dyn EffectApplier>,
    ) -> Self {
        Self {
            validator,
            schema: DEFAULT_SCHEMA.to_string(),
            authenticator,
            resolver,
            effect,
        }
    }

    /// Validates against `schema` instead of [`DEFAULT_SCHEMA`].
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Runs one delivery through the pipeline.
    pub async fn process(&self, payload: &[u8]) -> Result<Outcome, WebhookError> {
        let start = Instant::now();

        if payload.is_empty() {
            let err = WebhookError::EmptyPayload;
            error!(error = %err, "webhook_rejected");
            return Err(err);
        }

        let decoded = match self.decode(payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                error!(
                    error = %err,
                    body_bytes = payload.len(),
                    body = %redact_raw(&String::from_utf8_lossy(payload)),
                    "webhook_rejected"
                );
                return Err(err);
            }
        };

        let validated = self.validator.validate_value(decoded.clone(), &self.schema);
        let notification = match validated {
            Ok(ValidationOutcome::Valid(notification)) => notification,
            Ok(ValidationOutcome::Invalid(report)) => {
                error!(
                    schema = %self.schema,
                    violations = report.len(),
                    report = %report.render(),
                    payload = %redact_secret(&decoded),
                    "webhook_schema_invalid"
                );
                return Err(WebhookError::SchemaInvalid {
                    schema: self.schema.clone(),
                    report,
                });
            }
            Err(err) => {
                error!(
                    error = %err,
                    configuration = err.is_configuration(),
                    "webhook_rejected"
                );
                return Err(err);
            }
        };

        debug!(
            payload = %redact_secret(&notification),
            "webhook_notification_decoded"
        );

        let claimed = notification.get(SECRET_FIELD).and_then(Value::as_str);
        if !self.authenticator.check(claimed) {
            warn!(
                secret_present = claimed.is_some(),
                notification_id = notification_id(&notification).unwrap_or("-"),
                "webhook_unauthenticated"
            );
            return Ok(Outcome::Rejected(Rejection::BadSecret));
        }

        let identifier = notification.get(IDENTIFIER_FIELD).and_then(Value::as_str);
        let account = match self.resolver.resolve(identifier).await {
            Ok(Resolution::Found {
                identifier,
                account,
            }) => {
                debug!(identifier = %identifier, account = %account, "webhook_account_resolved");
                account
            }
            Ok(Resolution::NoIdentifier) => {
                warn!(
                    notification_id = notification_id(&notification).unwrap_or("-"),
                    "webhook_no_identifier"
                );
                return Ok(Outcome::Rejected(Rejection::NoIdentifier));
            }
            Ok(Resolution::NotFound { identifier }) => {
                warn!(
                    identifier = %identifier,
                    notification_id = notification_id(&notification).unwrap_or("-"),
                    "webhook_account_not_found"
                );
                return Ok(Outcome::Rejected(Rejection::AccountNotFound { identifier }));
            }
            Err(err) => {
                let err = WebhookError::from(err);
                error!(error = %err, "webhook_rejected");
                return Err(err);
            }
        };

        if let Err(err) = self.effect.apply(&account, &notification).await {
            let err = WebhookError::from(err);
            error!(account = %account, error = %err, "webhook_effect_failed");
            return Err(err);
        }

        info!(
            account = %account,
            elapsed_micros = start.elapsed().as_micros(),
            "webhook_applied"
        );
        Ok(Outcome::Applied { account })
    }

    fn decode(&self, payload: &[u8]) -> Result<Value, WebhookError> {
        let raw = std::str::from_utf8(payload)
            .map_err(|err| WebhookError::MalformedJson(format!("payload is not utf-8: {err}")))?;
        serde_json::from_str(raw).map_err(|err| WebhookError::MalformedJson(err.to_string()))
    }
}

impl fmt::Debug for WebhookProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookProcessor")
            .field("schema", &self.schema)
            .field("authenticator", &self.authenticator)
            .finish_non_exhaustive()
    }
}

/// Provider id of the notification, used for log context and deduplication.
pub(crate) fn notification_id(notification: &Value) -> Option<&str> {
    notification.pointer("/notification/id").and_then(Value::as_str)
}

/// Bounded preview of a body that did not decode, with the value following
/// every `"password"` key masked.
fn redact_raw(body: &str) -> String {
    let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    let key = format!("\"{SECRET_FIELD}\"");
    let mut out = String::with_capacity(preview.len());
    let mut rest = preview.as_str();

    while let Some(at) = rest.find(&key) {
        let (head, tail) = rest.split_at(at + key.len());
        out.push_str(head);

        let after_key = tail.trim_start();
        let Some(after_colon) = after_key.strip_prefix(':') else {
            rest = tail;
            continue;
        };
        let value = after_colon.trim_start();
        match value.strip_prefix('"') {
            Some(quoted) => {
                out.push_str(":\"");
                out.push_str(REDACTED);
                rest = closing_quote(quoted).map_or("", |end| &quoted[end..]);
            }
            None => {
                out.push(':');
                out.push_str(REDACTED);
                let end = value.find([',', '}']).unwrap_or(value.len());
                rest = &value[end..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Byte offset of the unescaped `"` closing a JSON string body.
fn closing_quote(s: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => return Some(i),
            _ => {}
        }
    }
    None
}

/// Copy of `notification` safe to log: the claimed secret is replaced.
pub fn redact_secret(notification: &Value) -> Value {
    let mut copy = notification.clone();
    if let Some(secret) = copy.get_mut(SECRET_FIELD) {
        *secret = Value::String(REDACTED.to_string());
    }
    copy
}
