use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::utils::{get_env_parsed, get_env_with_prefix};

/// Session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    /// Session lifetime (in seconds)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Directory for the file-backed session slot. In-memory when unset.
    #[serde(default)]
    pub storage_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            storage_path: None,
        }
    }
}

impl SessionConfig {
    /// Load session configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(seconds) = get_env_parsed("SESSION_TTL_SECONDS") {
            config.ttl_seconds = seconds;
        }

        if let Some(path) = get_env_with_prefix("SESSION_STORAGE_PATH") {
            config.storage_path = Some(PathBuf::from(path));
        }

        config
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

fn default_ttl_seconds() -> u64 {
    3600 * 24 // 24 hours
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(86_400));
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn test_serde_defaults() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.ttl_seconds, 86_400);

        let config: SessionConfig =
            serde_json::from_str(r#"{"ttl_seconds": 60, "storage_path": "/tmp/s"}"#).unwrap();
        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert_eq!(config.storage_path, Some(PathBuf::from("/tmp/s")));
    }

    #[test]
    fn test_from_env() {
        unsafe {
            std::env::set_var("PLANGATE_SESSION_TTL_SECONDS", "120");
            std::env::set_var("PLANGATE_SESSION_STORAGE_PATH", "/var/lib/plangate");
        }

        let config = SessionConfig::from_env();
        assert_eq!(config.ttl_seconds, 120);
        assert_eq!(config.storage_path, Some(PathBuf::from("/var/lib/plangate")));

        unsafe {
            std::env::remove_var("PLANGATE_SESSION_TTL_SECONDS");
            std::env::remove_var("PLANGATE_SESSION_STORAGE_PATH");
        }
    }
}
