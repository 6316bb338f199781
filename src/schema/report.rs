//! Structured diagnostics for payloads that fail schema validation.

use std::fmt;

use jsonschema::ValidationError;
use jsonschema::error::ValidationErrorKind;
use serde::Serialize;

/// One schema violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON Pointer to the offending node. For `required` this addresses the
    /// missing member itself rather than its parent object.
    pub pointer: String,
    /// The schema keyword that failed (`type`, `required`, `enum`, ...).
    pub keyword: String,
    pub message: String,
}

impl Violation {
    pub(crate) fn from_error(err: &ValidationError<'_>) -> Self {
        let mut pointer = err.instance_path.to_string();
        if let ValidationErrorKind::Required { property } = &err.kind {
            if let Some(name) = property.as_str() {
                pointer.push('/');
                pointer.push_str(&escape_pointer_token(name));
            }
        }

        let keyword = match &err.kind {
            ValidationErrorKind::FalseSchema => "false".to_string(),
            _ => err
                .schema_path
                .to_string()
                .rsplit('/')
                .next()
                .filter(|segment| !segment.is_empty())
                .unwrap_or("schema")
                .to_string(),
        };

        Self {
            pointer,
            keyword,
            message: err.to_string(),
        }
    }

    fn location(&self) -> &str {
        if self.pointer.is_empty() {
            "/"
        } else {
            &self.pointer
        }
    }
}

/// Every violation found in one validation pass, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorReport {
    violations: Vec<Violation>,
}

impl ErrorReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter()
    }

    pub fn len(&self) -> usize {
        self.violations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    /// True if any violation points at `pointer`.
    pub fn mentions(&self, pointer: &str) -> bool {
        self.violations.iter().any(|v| v.pointer == pointer)
    }

    /// First violation on a single line.
    pub fn terse(&self) -> String {
        match self.violations.first() {
            Some(first) => format!("{} [{}]: {}", first.location(), first.keyword, first.message),
            None => "no violations".to_string(),
        }
    }

    /// All violations as pretty-printed JSON.
    pub fn verbose(&self) -> String {
        serde_json::to_string_pretty(&self.violations).unwrap_or_else(|_| self.terse())
    }

    /// Verbose listing followed by the terse summary, for log records.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.verbose(), self.terse())
    }
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.violations.len() {
            0 => f.write_str("no violations"),
            1 => f.write_str(&self.terse()),
            n => write!(f, "{} (and {} more)", self.terse(), n - 1),
        }
    }
}

/// RFC 6901 escaping for a single reference token.
fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
