//! Delivery boundary: every notification is acknowledged.
//!
//! The outcome of a delivery is only visible through logs and the
//! `iaptic_webhook_notifications_total` counter, never in the response.

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::processor::WebhookProcessor;

/// Body returned for every delivery.
pub const ACKNOWLEDGEMENT_MESSAGE: &str = "Notification received.";

/// Counter incremented once per delivery, labelled by `outcome`.
pub const NOTIFICATIONS_COUNTER: &str = "iaptic_webhook_notifications_total";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
}

impl Default for Acknowledgement {
    fn default() -> Self {
        Self {
            message: ACKNOWLEDGEMENT_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WebhookEndpoint {
    processor: WebhookProcessor,
}

impl WebhookEndpoint {
    pub fn new(processor: WebhookProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &WebhookProcessor {
        &self.processor
    }

    /// Runs the pipeline and acknowledges regardless of the result.
    pub async fn receive(&self, payload: &[u8]) -> Acknowledgement {
        let outcome = match self.processor.process(payload).await {
            Ok(outcome) => outcome.label(),
            Err(err) => {
                if err.is_configuration() {
                    error!(
                        error = %err,
                        "webhook pipeline misconfigured; notification dropped"
                    );
                }
                err.kind()
            }
        };

        metrics::counter!(NOTIFICATIONS_COUNTER, "outcome" => outcome).increment(1);
        Acknowledgement::default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::account::{AccountHandle, AccountResolver};
    use crate::auth::{Secret, SecretAuthenticator};
    use crate::schema::{DEFAULT_BASE_URI, SchemaRegistry, SchemaValidator};
    use crate::store::{InMemoryAccounts, ReceiptLedger};

    fn endpoint(ledger: Arc<ReceiptLedger>) -> WebhookEndpoint {
        let schema = json!({
            "type": "object",
            "required": ["type"],
            "properties": { "type": { "const": "purchases.updated" } }
        });
        let registry =
            SchemaRegistry::from_documents(DEFAULT_BASE_URI, [("iaptic-webhook", schema)])
                .unwrap();
        let accounts = InMemoryAccounts::new();
        accounts.insert("U1", AccountHandle::new("A"));

        WebhookEndpoint::new(WebhookProcessor::new(
            SchemaValidator::new(Arc::new(registry)),
            SecretAuthenticator::new(Secret::new("S").unwrap()),
            AccountResolver::new(Arc::new(accounts)),
            ledger,
        ))
    }

    #[tokio::test]
    async fn test_acknowledges_applied_notification() {
        let ledger = Arc::new(ReceiptLedger::new());
        let ack = endpoint(ledger.clone())
            .receive(br#"{"type":"purchases.updated","password":"S","applicationUsername":"U1"}"#)
            .await;

        assert_eq!(ack, Acknowledgement::default());
        assert_eq!(ledger.total(), 1);
    }

    #[tokio::test]
    async fn test_acknowledges_every_failure() {
        let ledger = Arc::new(ReceiptLedger::new());
        let endpoint = endpoint(ledger.clone());
        let payloads: [&[u8]; 5] = [
            b"",
            b"{not json",
            br#"{"type":"other"}"#,
            br#"{"type":"purchases.updated","password":"wrong","applicationUsername":"U1"}"#,
            br#"{"type":"purchases.updated","password":"S","applicationUsername":"nobody"}"#,
        ];

        for payload in payloads {
            let ack = endpoint.receive(payload).await;
            assert_eq!(ack.message, ACKNOWLEDGEMENT_MESSAGE);
        }
        assert_eq!(ledger.total(), 0);
    }

    #[test]
    fn test_counts_each_delivery_by_outcome() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let endpoint = endpoint(Arc::new(ReceiptLedger::new()));

        metrics::with_local_recorder(&recorder, || {
            runtime.block_on(async {
                endpoint
                    .receive(br#"{"type":"purchases.updated","password":"S","applicationUsername":"U1"}"#)
                    .await;
                endpoint
                    .receive(br#"{"type":"purchases.updated","password":"forged","applicationUsername":"U1"}"#)
                    .await;
                endpoint.receive(b"").await;
            });
        });

        let rendered = handle.render();
        assert!(rendered.contains(NOTIFICATIONS_COUNTER));
        assert!(rendered.contains(r#"outcome="applied"} 1"#));
        assert!(rendered.contains(r#"outcome="bad_secret"} 1"#));
        assert!(rendered.contains(r#"outcome="empty_payload"} 1"#));
    }
}
