//! plangate API server.
//!
//! Configuration comes from the environment (`PLANGATE_<KEY>` or `<KEY>`).
//! The server refuses to start without `SSO_SECRET_KEY`, `GHL_API_KEY` and
//! `GHL_LOCATION_ID`.

use anyhow::Context;
use plangate::{App, AppContext, ConfigBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new()
        .from_env()
        .build()
        .context("invalid configuration")?;

    plangate::init_tracing_with_config(&config);
    tracing::debug!(target: "plangate.config", ?config, "Configuration loaded");

    let context = AppContext::from_config(&config).context("failed to initialize services")?;
    if context.embedder.is_none() {
        tracing::warn!(
            target: "plangate.config",
            "CYFE_WHITELABEL_DOMAIN is not set; embed and login URLs are disabled"
        );
    }

    if context.webhooks.is_none() {
        tracing::warn!(
            target: "plangate.config",
            "GHL_WEBHOOK_SECRET is not set; CRM webhooks are rejected"
        );
    }

    let addr = config.server.addr().context("invalid server address")?;
    App::new(context).serve(addr).await.context("server error")?;

    Ok(())
}
