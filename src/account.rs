//! Mapping the notification's `applicationUsername` to a local account.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LookupError;

/// Opaque reference to a local account, as returned by the lookup backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountHandle(String);

impl AccountHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account storage keyed by external identifier.
///
/// An empty result means "no such account"; `Err` means the backend itself
/// failed. Implementations may return several matches; only the first is
/// used.
#[async_trait]
pub trait AccountLookup: Send + Sync {
    async fn find_by_identifier(&self, identifier: &str)
    -> Result<Vec<AccountHandle>, LookupError>;
}

/// What [`AccountResolver::resolve`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The notification carried no identifier.
    NoIdentifier,
    /// An identifier was present but matched nothing.
    NotFound { identifier: String },
    Found {
        identifier: String,
        account: AccountHandle,
    },
}

/// Resolves identifiers through an injected [`AccountLookup`].
#[derive(Clone)]
pub struct AccountResolver {
    lookup: Arc<dyn AccountLookup>,
}

impl AccountResolver {
    pub fn new(lookup: Arc<dyn AccountLookup>) -> Self {
        Self { lookup }
    }

    pub async fn resolve(&self, identifier: Option<&str>) -> Result<Resolution, LookupError> {
        let Some(identifier) = identifier else {
            return Ok(Resolution::NoIdentifier);
        };

        let matches = self.lookup.find_by_identifier(identifier).await?;
        let identifier = identifier.to_string();
        Ok(match matches.into_iter().next() {
            Some(account) => Resolution::Found {
                identifier,
                account,
            },
            None => Resolution::NotFound { identifier },
        })
    }
}

impl fmt::Debug for AccountResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountResolver").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeLookup {
        accounts: HashMap<String, Vec<AccountHandle>>,
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl AccountLookup for FakeLookup {
        async fn find_by_identifier(
            &self,
            identifier: &str,
        ) -> Result<Vec<AccountHandle>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError("database unavailable".into()));
            }
            Ok(self.accounts.get(identifier).cloned().unwrap_or_default())
        }
    }

    fn resolver_with(lookup: FakeLookup) -> (AccountResolver, Arc<FakeLookup>) {
        let lookup = Arc::new(lookup);
        (AccountResolver::new(lookup.clone()), lookup)
    }

    #[tokio::test]
    async fn test_absent_identifier_skips_lookup() {
        let (resolver, lookup) = resolver_with(FakeLookup::default());
        assert_eq!(resolver.resolve(None).await, Ok(Resolution::NoIdentifier));
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unknown_identifier() {
        let (resolver, _) = resolver_with(FakeLookup::default());
        assert_eq!(
            resolver.resolve(Some("u-404")).await,
            Ok(Resolution::NotFound {
                identifier: "u-404".into()
            })
        );
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let mut accounts = HashMap::new();
        accounts.insert(
            "u-1".to_string(),
            vec![AccountHandle::new("acct-a"), AccountHandle::new("acct-b")],
        );
        let (resolver, _) = resolver_with(FakeLookup {
            accounts,
            ..Default::default()
        });

        let Resolution::Found { account, .. } = resolver.resolve(Some("u-1")).await.unwrap() else {
            panic!("expected a match");
        };
        assert_eq!(account, AccountHandle::new("acct-a"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_not_not_found() {
        let (resolver, _) = resolver_with(FakeLookup {
            fail: true,
            ..Default::default()
        });
        assert_eq!(
            resolver.resolve(Some("u-1")).await,
            Err(LookupError("database unavailable".into()))
        );
    }
}
