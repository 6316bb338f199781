//! JSON Schema loading and validation.
//!
//! - [`SchemaRegistry`] loads `*.schema.json` documents once and compiles them.
//! - [`SchemaValidator`] decodes a payload and checks it against a named
//!   document, returning a [`ValidationOutcome`].
//! - [`ErrorReport`] carries every violation with its JSON Pointer.

mod registry;
mod report;
mod validator;

pub use registry::{
    DEFAULT_BASE_URI, SCHEMA_SUFFIX, SchemaDocument, SchemaLoadError, SchemaRegistry,
};
pub use report::{ErrorReport, Violation};
pub use validator::{SchemaValidator, ValidationOutcome};
