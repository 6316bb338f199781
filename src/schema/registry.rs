//! Named JSON Schema documents, loaded once and read many times.
//!
//! Every document lives under a single base-URI prefix:
//!
//! ```text
//! <schema_dir>/iaptic-webhook.schema.json   ->  https://www.example.com/iaptic-webhook.schema.json
//! <schema_dir>/iaptic-purchase.schema.json  ->  https://www.example.com/iaptic-purchase.schema.json
//! ```
//!
//! `$ref` resolution is served from that mapping only. A reference to any URI
//! outside the registry fails at load time, so a schema can never make the
//! process fetch a remote document.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use jsonschema::{Retrieve, Uri, Validator};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::WebhookError;

/// File suffix every schema document carries on disk.
pub const SCHEMA_SUFFIX: &str = ".schema.json";

/// Prefix schema documents are addressed under when none is configured.
pub const DEFAULT_BASE_URI: &str = "https://www.example.com/";

/// Errors raised while building a [`SchemaRegistry`].
///
/// All of them are configuration problems and should stop startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SchemaLoadError {
    #[error("failed to read schema directory {}: {message}", .path.display())]
    ReadDir { path: PathBuf, message: String },

    #[error("failed to read schema file {}: {message}", .path.display())]
    ReadFile { path: PathBuf, message: String },

    #[error("schema {name} is not valid JSON: {message}")]
    Parse { name: String, message: String },

    #[error("schema {name} failed to compile: {message}")]
    Compile { name: String, message: String },

    #[error("schema {0} registered more than once")]
    Duplicate(String),

    #[error("schema base uri cannot be empty")]
    EmptyBaseUri,
}

/// One compiled schema, immutable after load.
pub struct SchemaDocument {
    name: String,
    uri: String,
    contents: Value,
    validator: Validator,
}

impl SchemaDocument {
    /// Registry key, e.g. `iaptic-webhook`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical URI the document is addressed under.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Raw schema JSON, including the `$id` assigned at load.
    pub fn contents(&self) -> &Value {
        &self.contents
    }

    pub(crate) fn validator(&self) -> &Validator {
        &self.validator
    }
}

impl fmt::Debug for SchemaDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDocument")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .finish_non_exhaustive()
    }
}

/// Serves `$ref` targets from the registry's own documents and nothing else.
struct PrefixRetriever {
    documents: Arc<HashMap<String, Value>>,
}

impl Retrieve for PrefixRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let requested = uri.as_str();
        let key = requested.split('#').next().unwrap_or(requested);
        match self.documents.get(key) {
            Some(contents) => Ok(contents.clone()),
            None => Err(format!("schema reference {requested} is outside the registry").into()),
        }
    }
}

/// Index of compiled schema documents keyed by name.
///
/// Cheap to clone; clones share the same documents.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    base_uri: String,
    documents: Arc<HashMap<String, SchemaDocument>>,
}

impl SchemaRegistry {
    /// Loads every `*.schema.json` file in `dir`.
    ///
    /// The registry key is the file name without the suffix.
    pub fn from_dir(dir: impl AsRef<Path>, base_uri: &str) -> Result<Self, SchemaLoadError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|err| SchemaLoadError::ReadDir {
            path: dir.to_path_buf(),
            message: err.to_string(),
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SchemaLoadError::ReadDir {
                path: dir.to_path_buf(),
                message: err.to_string(),
            })?;
            let path = entry.path();
            let is_schema = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(SCHEMA_SUFFIX));
            if is_schema && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        let mut documents = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(name) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| name.strip_suffix(SCHEMA_SUFFIX))
                .map(str::to_owned)
            else {
                continue;
            };
            let raw = fs::read_to_string(&path).map_err(|err| SchemaLoadError::ReadFile {
                path: path.clone(),
                message: err.to_string(),
            })?;
            let contents: Value =
                serde_json::from_str(&raw).map_err(|err| SchemaLoadError::Parse {
                    name: name.clone(),
                    message: err.to_string(),
                })?;
            debug!(schema = %name, path = %path.display(), "schema_file_read");
            documents.push((name, contents));
        }

        Self::from_documents(base_uri, documents)
    }

    /// Builds a registry from in-memory documents.
    ///
    /// Documents without an `$id` are given `<base_uri><name>.schema.json` so
    /// relative references resolve inside the prefix.
    pub fn from_documents<I, N>(base_uri: &str, documents: I) -> Result<Self, SchemaLoadError>
    where
        I: IntoIterator<Item = (N, Value)>,
        N: Into<String>,
    {
        let base_uri = normalize_base_uri(base_uri)?;

        let mut raw: Vec<(String, String, Value)> = Vec::new();
        for (name, mut contents) in documents {
            let name = name.into();
            if raw.iter().any(|(existing, _, _)| existing == &name) {
                return Err(SchemaLoadError::Duplicate(name));
            }
            let uri = format!("{base_uri}{name}{SCHEMA_SUFFIX}");
            if let Value::Object(map) = &mut contents {
                map.entry("$id")
                    .or_insert_with(|| Value::String(uri.clone()));
            }
            raw.push((name, uri, contents));
        }

        let by_uri: Arc<HashMap<String, Value>> = Arc::new(
            raw.iter()
                .map(|(_, uri, contents)| (uri.clone(), contents.clone()))
                .collect(),
        );

        let mut documents = HashMap::with_capacity(raw.len());
        for (name, uri, contents) in raw {
            let validator = jsonschema::options()
                .should_validate_formats(true)
                .with_retriever(PrefixRetriever {
                    documents: Arc::clone(&by_uri),
                })
                .build(&contents)
                .map_err(|err| SchemaLoadError::Compile {
                    name: name.clone(),
                    message: err.to_string(),
                })?;
            documents.insert(
                name.clone(),
                SchemaDocument {
                    name,
                    uri,
                    contents,
                    validator,
                },
            );
        }

        info!(
            base_uri = %base_uri,
            schemas = documents.len(),
            "schema_registry_loaded"
        );

        Ok(Self {
            base_uri,
            documents: Arc::new(documents),
        })
    }

    /// Returns the document registered under `name`.
    pub fn load(&self, name: &str) -> Result<&SchemaDocument, WebhookError> {
        self.documents
            .get(name)
            .ok_or_else(|| WebhookError::SchemaNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.documents.contains_key(name)
    }

    /// Registered keys in sorted order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.documents.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn normalize_base_uri(base_uri: &str) -> Result<String, SchemaLoadError> {
    let trimmed = base_uri.trim();
    if trimmed.is_empty() {
        return Err(SchemaLoadError::EmptyBaseUri);
    }
    let mut uri = trimmed.to_string();
    if !uri.ends_with('/') {
        uri.push('/');
    }
    Ok(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn purchase_schema() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "required": ["productId"],
            "properties": { "productId": { "type": "string" } }
        })
    }

    #[test]
    fn test_load_registered_schema() {
        let registry =
            SchemaRegistry::from_documents(DEFAULT_BASE_URI, [("purchase", purchase_schema())])
                .unwrap();

        let doc = registry.load("purchase").unwrap();
        assert_eq!(doc.name(), "purchase");
        assert_eq!(doc.uri(), "https://www.example.com/purchase.schema.json");
        assert_eq!(doc.contents()["$id"], json!(doc.uri()));
        assert!(registry.contains("purchase"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_missing_schema_is_reported() {
        let registry =
            SchemaRegistry::from_documents(DEFAULT_BASE_URI, [("purchase", purchase_schema())])
                .unwrap();

        let err = registry.load("iaptic-webhook").unwrap_err();
        assert_eq!(err, WebhookError::SchemaNotFound("iaptic-webhook".into()));
    }

    #[test]
    fn test_base_uri_gets_trailing_slash() {
        let registry = SchemaRegistry::from_documents(
            "urn:example:schemas",
            [("purchase", purchase_schema())],
        )
        .unwrap();
        assert_eq!(registry.base_uri(), "urn:example:schemas/");
    }

    #[test]
    fn test_empty_base_uri_rejected() {
        let err = SchemaRegistry::from_documents("  ", [("purchase", purchase_schema())])
            .unwrap_err();
        assert_eq!(err, SchemaLoadError::EmptyBaseUri);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let err = SchemaRegistry::from_documents(
            DEFAULT_BASE_URI,
            [("purchase", purchase_schema()), ("purchase", json!({}))],
        )
        .unwrap_err();
        assert_eq!(err, SchemaLoadError::Duplicate("purchase".into()));
    }

    #[test]
    fn test_ref_between_registered_documents() {
        let envelope = json!({
            "type": "object",
            "properties": { "purchase": { "$ref": "purchase.schema.json" } }
        });
        let registry = SchemaRegistry::from_documents(
            DEFAULT_BASE_URI,
            [("purchase", purchase_schema()), ("envelope", envelope)],
        )
        .unwrap();

        let validator = registry.load("envelope").unwrap().validator();
        assert!(validator.is_valid(&json!({ "purchase": { "productId": "p1" } })));
        assert!(!validator.is_valid(&json!({ "purchase": {} })));
    }

    #[test]
    fn test_ref_outside_prefix_fails_to_compile() {
        let escaping = json!({
            "type": "object",
            "properties": { "x": { "$ref": "https://attacker.invalid/payload.schema.json" } }
        });
        let err = SchemaRegistry::from_documents(DEFAULT_BASE_URI, [("escaping", escaping)])
            .unwrap_err();
        assert!(matches!(err, SchemaLoadError::Compile { ref name, .. } if name == "escaping"));
    }

    #[test]
    fn test_from_dir_reads_schema_files_only() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("purchase.schema.json"),
            purchase_schema().to_string(),
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a schema").unwrap();

        let registry = SchemaRegistry::from_dir(dir.path(), DEFAULT_BASE_URI).unwrap();
        assert_eq!(registry.names(), vec!["purchase"]);
    }

    #[test]
    fn test_from_dir_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.schema.json"), "{ not json").unwrap();

        let err = SchemaRegistry::from_dir(dir.path(), DEFAULT_BASE_URI).unwrap_err();
        assert!(matches!(err, SchemaLoadError::Parse { ref name, .. } if name == "broken"));
    }

    #[test]
    fn test_from_missing_dir() {
        let err = SchemaRegistry::from_dir("/nonexistent/iaptic/schemas", DEFAULT_BASE_URI)
            .unwrap_err();
        assert!(matches!(err, SchemaLoadError::ReadDir { .. }));
    }
}
