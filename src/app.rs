use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Argon2Credentials, Authenticator};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::contacts::{GhlContactDirectory, WebhookVerifier};
use crate::error::{PlanGateError, Result};
use crate::gate::AccessGate;
use crate::health::{ContactDirectoryHealthCheck, HealthChecker};
use crate::plans::{DashboardCatalog, PlanCatalog, PlanChangeLog, PlanResolver, Tier};
use crate::session::{DEFAULT_SESSION_TTL, Session};
use crate::sso::{DashboardEmbedder, SsoToken, SsoTokenCodec};

/// Shared state for every HTTP handler.
///
/// Holds only stateless services; sessions travel with each request as a
/// signed bearer token.
#[derive(Clone)]
pub struct AppContext {
    pub authenticator: Authenticator,
    pub codec: SsoTokenCodec,
    pub gate: AccessGate,
    pub catalog: Arc<PlanCatalog>,
    pub dashboards: Arc<DashboardCatalog>,
    /// Present when a white-label dashboard host is configured.
    pub embedder: Option<DashboardEmbedder>,
    pub health: Arc<HealthChecker>,
    pub clock: Arc<dyn Clock>,
    pub session_ttl: Duration,
    /// Latest tier seen per contact; newer than a token's tier wins.
    pub plan_changes: Arc<PlanChangeLog>,
    /// Present when a webhook secret is configured.
    pub webhooks: Option<WebhookVerifier>,
}

impl AppContext {
    pub fn builder(authenticator: Authenticator, codec: SsoTokenCodec) -> AppContextBuilder {
        AppContextBuilder::new(authenticator, codec)
    }

    /// Wire the GoHighLevel directory, Argon2 credentials and SSO codec
    /// described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the SSO secret or CRM credentials are missing, or a URL in
    /// the configuration does not parse.
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let catalog = Arc::new(PlanCatalog::default());
        let directory = Arc::new(GhlContactDirectory::from_config(&config.crm, catalog.clone())?);
        let credentials = Argon2Credentials::new(directory.clone());
        let authenticator = Authenticator::new(
            directory.clone(),
            Arc::new(credentials),
            PlanResolver::new(catalog.clone()),
        );

        let secret = config
            .sso
            .secret_key
            .clone()
            .ok_or_else(|| PlanGateError::internal("SSO secret is not configured"))?;
        let codec = SsoTokenCodec::new(secret)?.with_ttl(config.sso.token_ttl())?;

        let mut builder = Self::builder(authenticator, codec)
            .with_catalog(catalog)
            .with_session_ttl(config.session.ttl())
            .with_health(
                HealthChecker::new()
                    .with_check(Arc::new(ContactDirectoryHealthCheck::new(directory))),
            );
        if let Some(host) = &config.sso.whitelabel_domain {
            builder = builder.with_dashboard_host(host.clone());
        }
        if let Some(secret) = &config.crm.webhook_secret {
            builder = builder.with_webhook_secret(secret.clone());
        }
        builder.build()
    }

    /// Token that stands in for `session` on later requests.
    pub fn session_token(&self, session: &Session) -> Result<SsoToken> {
        self.codec.issue_for_session(session)
    }

    pub fn embedder(&self) -> Result<&DashboardEmbedder> {
        self.embedder
            .as_ref()
            .ok_or_else(|| PlanGateError::internal("Dashboard host is not configured"))
    }

    pub fn webhook_verifier(&self) -> Result<&WebhookVerifier> {
        self.webhooks
            .as_ref()
            .ok_or_else(|| PlanGateError::internal("Webhook secret is not configured"))
    }

    /// Note the tier just read from the CRM for `contact_id`.
    pub fn remember_tier(&self, contact_id: &str, tier: Tier) {
        self.plan_changes.record(contact_id, tier, self.clock.now());
    }
}

/// Builder for [`AppContext`]
#[must_use = "builder does nothing until you call build()"]
pub struct AppContextBuilder {
    authenticator: Authenticator,
    codec: SsoTokenCodec,
    catalog: Arc<PlanCatalog>,
    dashboards: Arc<DashboardCatalog>,
    dashboard_host: Option<String>,
    health: HealthChecker,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
    webhook_secret: Option<SecretString>,
}

impl AppContextBuilder {
    pub fn new(authenticator: Authenticator, codec: SsoTokenCodec) -> Self {
        Self {
            authenticator,
            codec,
            catalog: Arc::new(PlanCatalog::default()),
            dashboards: Arc::new(DashboardCatalog::default()),
            dashboard_host: None,
            health: HealthChecker::new(),
            clock: Arc::new(SystemClock),
            session_ttl: DEFAULT_SESSION_TTL,
            webhook_secret: None,
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<PlanCatalog>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_dashboards(mut self, dashboards: Arc<DashboardCatalog>) -> Self {
        self.dashboards = dashboards;
        self
    }

    /// White-label host that embed and login URLs point at.
    pub fn with_dashboard_host(mut self, host: impl Into<String>) -> Self {
        self.dashboard_host = Some(host.into());
        self
    }

    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = health;
        self
    }

    /// Clock for session start times and gate checks. The codec keeps its own.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Enables the `/webhooks/ghl` endpoints.
    pub fn with_webhook_secret(mut self, secret: SecretString) -> Self {
        self.webhook_secret = Some(secret);
        self
    }

    pub fn build(self) -> Result<AppContext> {
        if self.session_ttl.is_zero() {
            return Err(PlanGateError::internal("Session TTL must be positive"));
        }

        let gate = AccessGate::new(self.catalog.clone()).with_clock(self.clock.clone());
        let embedder = self
            .dashboard_host
            .as_deref()
            .map(|host| {
                DashboardEmbedder::new(host, self.codec.clone(), gate.clone(), self.dashboards.clone())
            })
            .transpose()?;
        let webhooks = self.webhook_secret.map(WebhookVerifier::new).transpose()?;

        Ok(AppContext {
            authenticator: self.authenticator,
            codec: self.codec,
            gate,
            catalog: self.catalog,
            dashboards: self.dashboards,
            embedder,
            health: Arc::new(self.health),
            clock: self.clock,
            session_ttl: self.session_ttl,
            plan_changes: Arc::new(PlanChangeLog::new()),
            webhooks,
        })
    }
}
