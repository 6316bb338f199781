//! Shared-secret authentication.
//!
//! Iaptic embeds the secret configured in its dashboard as the `password`
//! member of every notification. The comparison runs through
//! [`subtle::ConstantTimeEq`] so response timing does not leak how much of a
//! guess matched.

use std::fmt;

use serde::{Deserialize, Deserializer};
use subtle::ConstantTimeEq;

use crate::error::WebhookError;

/// A configured credential. Never empty; never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    /// Wraps `value`, rejecting the empty string.
    pub fn new(value: impl Into<String>) -> Result<Self, WebhookError> {
        let value = value.into();
        if value.is_empty() {
            return Err(WebhookError::Configuration(
                "shared secret cannot be empty".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// The raw secret. Keep it out of logs.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

impl<'de> Deserialize<'de> for Secret {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Secret::new(value).map_err(serde::de::Error::custom)
    }
}

/// Compares a claimed secret against `expected`.
///
/// Fails with [`WebhookError::Configuration`] when `expected` is empty, so a
/// missing configuration can never authenticate anything. A missing claim is
/// an ordinary `false`.
pub fn authenticate(claimed: Option<&str>, expected: &str) -> Result<bool, WebhookError> {
    let expected = Secret::new(expected)?;
    Ok(SecretAuthenticator::new(expected).check(claimed))
}

/// Holds the expected secret for the lifetime of the processor.
#[derive(Debug, Clone)]
pub struct SecretAuthenticator {
    expected: Secret,
}

impl SecretAuthenticator {
    pub fn new(expected: Secret) -> Self {
        Self { expected }
    }

    /// True iff `claimed` is present and byte-for-byte equal to the
    /// expected secret.
    pub fn check(&self, claimed: Option<&str>) -> bool {
        match claimed {
            Some(claimed) => self
                .expected
                .expose()
                .as_bytes()
                .ct_eq(claimed.as_bytes())
                .into(),
            None => false,
        }
    }
}
