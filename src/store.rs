//! In-memory collaborators used by the binary and by tests.
//!
//! [`InMemoryAccounts`] stands in for the account database and
//! [`ReceiptLedger`] records applied notifications per account. Both are
//! `DashMap`-backed so concurrent deliveries do not serialize on one lock.
//! Neither persists anything; a deployment that acts on purchases plugs its
//! own [`AccountLookup`] and [`EffectApplier`] into the processor.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::Path;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use crate::account::{AccountHandle, AccountLookup};
use crate::config::ConfigError;
use crate::error::{EffectError, LookupError};
use crate::processor::{EffectApplier, notification_id, redact_secret};

/// Identifier → account map.
#[derive(Debug, Default)]
pub struct InMemoryAccounts {
    accounts: DashMap<String, Vec<AccountHandle>>,
}

impl InMemoryAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads a JSON object mapping identifiers to account ids:
    ///
    /// ```json
    /// { "0b9f2c1e-8d4a-4a51-9f3e-2d1c6b7a8e90": "user-17" }
    /// ```
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let accounts_file_error = |message: String| ConfigError::AccountsFile {
            path: path.to_path_buf(),
            message,
        };
        let raw = fs::read_to_string(path).map_err(|err| accounts_file_error(err.to_string()))?;
        let entries: HashMap<String, String> =
            serde_json::from_str(&raw).map_err(|err| accounts_file_error(err.to_string()))?;

        let store = Self::new();
        for (identifier, account) in entries {
            store.insert(identifier, AccountHandle::new(account));
        }
        info!(path = %path.display(), accounts = store.len(), "accounts_loaded");
        Ok(store)
    }

    pub fn insert(&self, identifier: impl Into<String>, account: AccountHandle) {
        self.accounts
            .entry(identifier.into())
            .or_default()
            .push(account);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

#[async_trait]
impl AccountLookup for InMemoryAccounts {
    async fn find_by_identifier(
        &self,
        identifier: &str,
    ) -> Result<Vec<AccountHandle>, LookupError> {
        Ok(self
            .accounts
            .get(identifier)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

/// Receipts kept per account by [`ReceiptLedger::new`].
pub const DEFAULT_RECEIPTS_PER_ACCOUNT: usize = 100;

/// Development sink keeping the most recent notifications applied to each
/// account.
///
/// At most `per_account` receipts are kept; the oldest is evicted first.
/// Redeliveries carrying a `notification.id` still held for the account are
/// ignored.
#[derive(Debug)]
pub struct ReceiptLedger {
    receipts: DashMap<AccountHandle, VecDeque<Value>>,
    per_account: usize,
}

impl Default for ReceiptLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECEIPTS_PER_ACCOUNT)
    }
}

impl ReceiptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ledger keeping at most `per_account` receipts per account (minimum 1).
    pub fn with_capacity(per_account: usize) -> Self {
        Self {
            receipts: DashMap::new(),
            per_account: per_account.max(1),
        }
    }

    /// Notifications recorded for `account`, oldest first.
    pub fn receipts(&self, account: &AccountHandle) -> Vec<Value> {
        self.receipts
            .get(account)
            .map(|entry| entry.value().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.receipts.iter().map(|entry| entry.value().len()).sum()
    }
}

#[async_trait]
impl EffectApplier for ReceiptLedger {
    async fn apply(
        &self,
        account: &AccountHandle,
        notification: &Value,
    ) -> Result<(), EffectError> {
        let mut entry = self.receipts.entry(account.clone()).or_default();
        if let Some(id) = notification_id(notification) {
            if entry.iter().any(|seen| notification_id(seen) == Some(id)) {
                info!(account = %account, notification_id = %id, "receipt_already_recorded");
                return Ok(());
            }
        }
        if entry.len() == self.per_account {
            entry.pop_front();
        }
        entry.push_back(redact_secret(notification));
        info!(account = %account, receipts = entry.len(), "receipt_recorded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_accounts_lookup() {
        let accounts = InMemoryAccounts::new();
        accounts.insert("u-1", AccountHandle::new("acct-1"));

        assert_eq!(
            accounts.find_by_identifier("u-1").await.unwrap(),
            vec![AccountHandle::new("acct-1")]
        );
        assert!(accounts.find_by_identifier("u-2").await.unwrap().is_empty());
    }

    #[test]
    fn test_accounts_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accounts.json");
        fs::write(&path, r#"{"u-1": "acct-1", "u-2": "acct-2"}"#).unwrap();

        let accounts = InMemoryAccounts::from_json_file(&path).unwrap();
        assert_eq!(accounts.len(), 2);

        fs::write(&path, "[1, 2]").unwrap();
        let err = InMemoryAccounts::from_json_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::AccountsFile { .. }));
        assert!(err.to_string().contains("accounts.json"));
    }

    #[test]
    fn test_missing_accounts_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = InMemoryAccounts::from_json_file(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::AccountsFile { .. }));
    }

    #[tokio::test]
    async fn test_ledger_evicts_oldest_beyond_capacity() {
        let ledger = ReceiptLedger::with_capacity(2);
        let account = AccountHandle::new("acct-1");
        for id in ["n-1", "n-2", "n-3"] {
            let notification = json!({ "notification": { "id": id } });
            ledger.apply(&account, &notification).await.unwrap();
        }

        let ids: Vec<_> = ledger
            .receipts(&account)
            .iter()
            .map(|receipt| receipt["notification"]["id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("n-2"), json!("n-3")]);
        assert_eq!(ledger.total(), 2);
    }

    #[tokio::test]
    async fn test_ledger_ignores_redelivery() {
        let ledger = ReceiptLedger::new();
        let account = AccountHandle::new("acct-1");
        let notification = json!({
            "password": "S",
            "notification": { "id": "n-1" }
        });

        ledger.apply(&account, &notification).await.unwrap();
        ledger.apply(&account, &notification).await.unwrap();

        let receipts = ledger.receipts(&account);
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0]["password"], json!("[redacted]"));
    }

    #[tokio::test]
    async fn test_ledger_keeps_notifications_without_id() {
        let ledger = ReceiptLedger::new();
        let account = AccountHandle::new("acct-1");
        let notification = json!({ "type": "purchases.updated" });

        ledger.apply(&account, &notification).await.unwrap();
        ledger.apply(&account, &notification).await.unwrap();
        assert_eq!(ledger.total(), 2);
    }
}
