//! plangate - plan-gated access control for a CRM-backed SaaS product
//!
//! Subscription tiers live in the CRM as tags on a contact. plangate turns
//! those tags into a tier, keeps a client session in sync with it, decides
//! what each tier may open, and hands out short-lived signed tokens for
//! embedded third-party dashboards.
//!
//! # Components
//!
//! - **Plans**: ordered tiers, their CRM tags and highest-tier-wins resolution
//! - **Contacts**: GoHighLevel directory client plus an in-memory stand-in
//! - **Auth**: Argon2 credential verification, login and signup
//! - **Sessions**: session lifecycle with a persisted, shareable storage slot
//! - **Gate**: pure allow/deny decisions against a required tier
//! - **SSO**: HMAC-SHA256 signed tokens and embed/login URLs
//! - **Webhooks**: signed CRM deliveries that push plan changes and revoke
//!   dashboards on a downgrade
//! - **HTTP**: axum API over all of the above
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use plangate::{App, AppContext, ConfigBuilder};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     plangate::init_tracing();
//!
//!     let config = ConfigBuilder::new().from_env().build()?;
//!     let context = AppContext::from_config(&config)?;
//!
//!     App::new(context).serve(config.server.addr()?).await?;
//!     Ok(())
//! }
//! ```

mod app;
pub mod auth;
pub mod clock;
pub mod config;
pub mod contacts;
mod core;
mod error;
pub mod gate;
pub mod health;
pub mod http;
pub mod plans;
pub mod session;
pub mod sso;
pub mod utils;

pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder, LoggingConfig, ServerConfig};
pub use crate::core::App;
pub use error::{ErrorResponse, PlanGateError, Result};
pub use gate::{AccessDecision, AccessGate, DenyReason};
pub use plans::{PlanCatalog, PlanResolver, Tier};
pub use session::{Session, SessionManager, SessionState};
pub use sso::{SsoPayload, SsoToken, SsoTokenCodec};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "plangate.session=debug")
/// - `PLANGATE_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("PLANGATE_LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    install(env_filter, json_logs);
}

/// Initialize tracing from [`LoggingConfig`]; `RUST_LOG` still wins when set.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    install(env_filter, config.logging.json);
}

fn install(env_filter: EnvFilter, json: bool) {
    let registry = tracing_subscriber::registry().with(env_filter);

    // try_init: a second call (e.g. from tests) keeps the first subscriber.
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Tracing subscriber already installed");
    }
}
