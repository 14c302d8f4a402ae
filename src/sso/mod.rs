//! Signed single sign-on tokens and embed URLs for the dashboard host.

mod codec;
mod config;
mod embed;

pub use codec::{DEFAULT_TOKEN_TTL, SESSION_AUDIENCE, SsoPayload, SsoToken, SsoTokenCodec};
pub use config::SsoConfig;
pub use embed::{ALL_DASHBOARDS_AUDIENCE, DashboardEmbedder, SignedUrl};
