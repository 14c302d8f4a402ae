use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::{get_env_parsed, get_env_with_prefix};

/// SSO token and dashboard host settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SsoConfig {
    /// Shared HMAC secret. Required to issue or verify any token.
    #[serde(default, skip_serializing)]
    pub secret_key: Option<SecretString>,

    /// Lifetime of dashboard tokens in seconds (default 300)
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,

    /// White-label dashboard host, e.g. `https://analytics.example.com`.
    #[serde(default)]
    pub whitelabel_domain: Option<String>,
}

impl Default for SsoConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            token_ttl_seconds: default_token_ttl_seconds(),
            whitelabel_domain: None,
        }
    }
}

impl SsoConfig {
    /// Load SSO configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secret) = get_env_with_prefix("SSO_SECRET_KEY") {
            config.secret_key = Some(SecretString::from(secret));
        }
        if let Some(ttl) = get_env_parsed("SSO_TOKEN_TTL_SECONDS") {
            config.token_ttl_seconds = ttl;
        }
        if let Some(domain) = get_env_with_prefix("CYFE_WHITELABEL_DOMAIN") {
            config.whitelabel_domain = Some(domain);
        }

        config
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }
}

fn default_token_ttl_seconds() -> u64 {
    300
}
