use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::contacts::CrmConfig;
use crate::error::{PlanGateError, Result};
use crate::session::SessionConfig;
use crate::sso::SsoConfig;
use crate::utils::{get_env_parsed, get_env_with_prefix};

/// Main configuration for a plangate server
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub crm: CrmConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub sso: SsoConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

impl Config {
    /// Check that everything a running server needs is present.
    ///
    /// [`ConfigBuilder::build`] only checks shape; this additionally
    /// requires the SSO secret and the CRM credentials.
    pub fn validate(&self) -> Result<()> {
        match &self.sso.secret_key {
            Some(secret) if !secret.expose_secret().trim().is_empty() => {}
            _ => return Err(PlanGateError::bad_request("SSO_SECRET_KEY must be set")),
        }

        if !self.crm.has_credentials() {
            return Err(PlanGateError::bad_request(
                "GHL_API_KEY and GHL_LOCATION_ID must be set",
            ));
        }

        Ok(())
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.config.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.config.logging.json = enabled;
        self
    }

    pub fn with_crm(mut self, crm: CrmConfig) -> Self {
        self.config.crm = crm;
        self
    }

    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.config.session = session;
        self
    }

    pub fn with_sso(mut self, sso: SsoConfig) -> Self {
        self.config.sso = sso;
        self
    }

    pub fn with_sso_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.sso.secret_key = Some(SecretString::from(secret.into()));
        self
    }

    /// Load configuration from environment variables with PLANGATE_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.config.server.host = host;
        }
        // PLANGATE_PORT first, then PORT for PaaS hosts
        if let Some(port) = get_env_parsed("PORT") {
            self.config.server.port = port;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.config.logging.level = level;
        }
        if let Some(json) = get_env_with_prefix("LOG_JSON") {
            self.config.logging.json = json.parse().unwrap_or(false);
        }

        self.config.crm = CrmConfig::from_env();
        self.config.session = SessionConfig::from_env();
        self.config.sso = SsoConfig::from_env();

        self
    }

    /// Build the configuration, validating its shape
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the server address (host:port) does not parse
    /// - the log level is unknown
    /// - a timeout or TTL is zero
    pub fn build(self) -> Result<Config> {
        let config = self.config;

        config.server.addr().map_err(|e| {
            PlanGateError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                config.server.host, config.server.port, e
            ))
        })?;

        if config.server.port == 0 {
            return Err(PlanGateError::bad_request("Server port must be greater than 0"));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(PlanGateError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                config.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if config.crm.timeout_seconds == 0 {
            return Err(PlanGateError::bad_request("CRM timeout must be greater than 0"));
        }
        if config.session.ttl_seconds == 0 {
            return Err(PlanGateError::bad_request("Session TTL must be greater than 0"));
        }
        if config.sso.token_ttl_seconds == 0 {
            return Err(PlanGateError::bad_request("SSO token TTL must be greater than 0"));
        }

        Ok(config)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
