//! Receiver for Iaptic purchase notifications.
//!
//! Iaptic validates in-app purchase receipts and pushes a webhook every time
//! a user's purchases change. This crate turns those deliveries into calls
//! on a local account:
//!
//! 1. **Decode** the body into JSON (empty or non-JSON bodies are errors).
//! 2. **Validate** it against the `iaptic-webhook` JSON Schema, collecting
//!    every violation with its JSON Pointer.
//! 3. **Authenticate** the embedded `password` against the configured shared
//!    secret in constant time.
//! 4. **Resolve** `applicationUsername` to an account through an
//!    [`AccountLookup`].
//! 5. **Apply** the notification through an [`EffectApplier`].
//!
//! Any failure stops the run. Deliveries are always acknowledged with
//! `{"message": "Notification received."}`; the reason a notification was
//! dropped is only visible in logs and metrics.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use iaptic_webhook::{
//!     AccountResolver, InMemoryAccounts, ReceiptLedger, SchemaRegistry, SchemaValidator,
//!     Secret, SecretAuthenticator, WebhookProcessor,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SchemaRegistry::from_dir("schema", "https://www.example.com/")?);
//! let processor = WebhookProcessor::new(
//!     SchemaValidator::new(registry),
//!     SecretAuthenticator::new(Secret::new("S")?),
//!     AccountResolver::new(Arc::new(InMemoryAccounts::new())),
//!     Arc::new(ReceiptLedger::new()),
//! );
//!
//! let outcome = processor.process(br#"{"type":"purchases.updated","purchases":{}}"#).await?;
//! println!("{}", outcome.label());
//! # Ok(())
//! # }
//! ```

pub mod account;
pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod processor;
pub mod schema;
pub mod store;

#[cfg(feature = "server")]
pub mod server;

pub use crate::account::{AccountHandle, AccountLookup, AccountResolver, Resolution};
pub use crate::auth::{Secret, SecretAuthenticator, authenticate};
pub use crate::config::{ConfigError, WebhookConfig};
pub use crate::endpoint::{ACKNOWLEDGEMENT_MESSAGE, Acknowledgement, WebhookEndpoint};
pub use crate::error::{EffectError, LookupError, WebhookError};
pub use crate::processor::{
    DEFAULT_SCHEMA, EffectApplier, Outcome, Rejection, Stage, WebhookProcessor, redact_secret,
};
pub use crate::schema::{
    ErrorReport, SchemaDocument, SchemaLoadError, SchemaRegistry, SchemaValidator,
    ValidationOutcome, Violation,
};
pub use crate::store::{InMemoryAccounts, ReceiptLedger};
