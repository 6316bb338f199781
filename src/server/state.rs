use std::sync::Arc;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusHandle;

use crate::account::{AccountLookup, AccountResolver};
use crate::auth::SecretAuthenticator;
use crate::config::WebhookConfig;
use crate::endpoint::WebhookEndpoint;
use crate::processor::{EffectApplier, WebhookProcessor};
use crate::schema::{SchemaRegistry, SchemaValidator};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<WebhookConfig>,

    /// Schemas loaded at startup (read-only afterwards)
    pub registry: Arc<SchemaRegistry>,

    pub endpoint: WebhookEndpoint,

    /// Installed Prometheus recorder, if metrics are enabled
    pub metrics: Option<PrometheusHandle>,

    pub started_at: Instant,
}

impl ServerState {
    /// Wire the pipeline from its collaborators.
    pub fn new(
        config: WebhookConfig,
        registry: Arc<SchemaRegistry>,
        lookup: Arc<dyn AccountLookup>,
        effect: Arc<dyn EffectApplier>,
    ) -> Self {
        let processor = WebhookProcessor::new(
            SchemaValidator::new(registry.clone()),
            SecretAuthenticator::new(config.secret.clone()),
            AccountResolver::new(lookup),
            effect,
        )
        .with_schema(config.schema_name.clone());

        Self {
            config: Arc::new(config),
            registry,
            endpoint: WebhookEndpoint::new(processor),
            metrics: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Ready once the configured schema is registered.
    pub fn is_ready(&self) -> bool {
        self.registry.contains(&self.config.schema_name)
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
