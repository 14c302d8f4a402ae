use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ghl::{DEFAULT_BASE_URL, DEFAULT_PASSWORD_FIELD};
use crate::utils::{get_env_parsed, get_env_with_prefix};

/// GoHighLevel connection settings.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CrmConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Private integration / location API key.
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    #[serde(default)]
    pub location_id: Option<String>,

    /// Upper bound for a single CRM request (default 10 s)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Custom field that stores the password hash.
    #[serde(default = "default_password_field")]
    pub password_field: String,

    /// Shared secret for inbound webhook signatures.
    #[serde(default, skip_serializing)]
    pub webhook_secret: Option<SecretString>,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            location_id: None,
            timeout_seconds: default_timeout_seconds(),
            password_field: default_password_field(),
            webhook_secret: None,
        }
    }
}

impl CrmConfig {
    /// Load CRM configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = get_env_with_prefix("GHL_BASE_URL") {
            config.base_url = url;
        }
        if let Some(key) = get_env_with_prefix("GHL_API_KEY") {
            config.api_key = Some(SecretString::from(key));
        }
        if let Some(location) = get_env_with_prefix("GHL_LOCATION_ID") {
            config.location_id = Some(location);
        }
        if let Some(seconds) = get_env_parsed("GHL_TIMEOUT_SECONDS") {
            config.timeout_seconds = seconds;
        }
        if let Some(field) = get_env_with_prefix("GHL_PASSWORD_FIELD") {
            config.password_field = field;
        }
        if let Some(secret) = get_env_with_prefix("GHL_WEBHOOK_SECRET") {
            config.webhook_secret = Some(SecretString::from(secret));
        }

        config
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Whether both the API key and the location id are set.
    pub fn has_credentials(&self) -> bool {
        self.api_key
            .as_ref()
            .is_some_and(|k| !k.expose_secret().is_empty())
            && self.location_id.as_deref().is_some_and(|l| !l.is_empty())
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_password_field() -> String {
    DEFAULT_PASSWORD_FIELD.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CrmConfig::default();
        assert_eq!(config.base_url, "https://services.leadconnectorhq.com");
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = CrmConfig {
            api_key: Some(SecretString::from("pit-very-secret".to_string())),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("pit-very-secret"));
        assert!(debug.contains("REDACTED"));
        assert!(config.api_key.is_some());
    }

    #[test]
    fn test_key_is_never_serialized() {
        let config = CrmConfig {
            api_key: Some(SecretString::from("pit-very-secret".to_string())),
            location_id: Some("loc".to_string()),
            webhook_secret: Some(SecretString::from("whsec-very-secret".to_string())),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("pit-very-secret"));
        assert!(!json.contains("whsec-very-secret"));
        assert!(!format!("{:?}", config).contains("whsec-very-secret"));
        assert!(config.has_credentials());
    }

    #[test]
    fn test_blank_key_is_not_a_credential() {
        let config = CrmConfig {
            api_key: Some(SecretString::from(String::new())),
            location_id: Some("loc".to_string()),
            ..Default::default()
        };
        assert!(!config.has_credentials());
    }
}
