//! Iaptic webhook receiver binary.
//!
//! Loads configuration, compiles the schema directory, seeds the in-memory
//! account store and serves the delivery endpoint until shutdown.

use std::sync::Arc;

use iaptic_webhook::server::{self, ServerState};
use iaptic_webhook::{InMemoryAccounts, ReceiptLedger, SchemaRegistry, WebhookConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = WebhookConfig::load()?;
    server::init_tracing(&config.log_level);

    let registry = Arc::new(SchemaRegistry::from_dir(
        &config.schema_dir,
        &config.schema_base_uri,
    )?);
    if !registry.contains(&config.schema_name) {
        anyhow::bail!(
            "schema {} not found in {}",
            config.schema_name,
            config.schema_dir.display()
        );
    }

    let accounts = match &config.accounts_file {
        Some(path) => InMemoryAccounts::from_json_file(path)?,
        None => {
            tracing::warn!("No accounts_file configured, every notification will be unmatched");
            InMemoryAccounts::new()
        }
    };

    let metrics_enabled = config.metrics_enabled;
    let mut state = ServerState::new(
        config,
        registry,
        Arc::new(accounts),
        Arc::new(ReceiptLedger::new()),
    );
    if metrics_enabled {
        state = state.with_metrics(server::install_metrics()?);
    }

    server::start_server(Arc::new(state)).await?;
    Ok(())
}
