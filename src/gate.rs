//! Plan-gated access checks.
//!
//! Every protected route or dashboard asks [`AccessGate::check`] before
//! serving anything. The check is pure: it only looks at the session it is
//! given and the clock.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::error::{PlanGateError, Result};
use crate::plans::{PlanCatalog, Tier};
use crate::session::Session;

/// Outcome of an access check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[must_use = "access decision must be used to enforce access control"]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// `Ok(())` on allow, the matching [`PlanGateError`] on deny.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Allow => Ok(()),
            Self::Deny(reason) => Err(reason.into()),
        }
    }
}

/// Why access was denied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    NotAuthenticated,
    Expired,
    /// Carries both tiers for an upgrade prompt.
    InsufficientPlan { current: Tier, required: Tier },
}

impl DenyReason {
    /// Where a browser should be sent: the login page, or the dashboard of
    /// the plan the user actually has.
    #[must_use]
    pub fn redirect_to(&self) -> String {
        match self {
            Self::NotAuthenticated | Self::Expired => "/login".to_string(),
            Self::InsufficientPlan { current, .. } => format!("/dashboard/{}", current),
        }
    }
}

impl From<DenyReason> for PlanGateError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::NotAuthenticated => PlanGateError::NotAuthenticated,
            DenyReason::Expired => PlanGateError::Expired,
            DenyReason::InsufficientPlan { current, required } => {
                PlanGateError::InsufficientPlan { current, required }
            }
        }
    }
}

/// Decides whether a session may access something that needs a tier.
#[derive(Clone, Debug)]
pub struct AccessGate {
    catalog: Arc<PlanCatalog>,
    clock: Arc<dyn Clock>,
}

impl Default for AccessGate {
    fn default() -> Self {
        Self::new(Arc::new(PlanCatalog::default()))
    }
}

impl AccessGate {
    pub fn new(catalog: Arc<PlanCatalog>) -> Self {
        Self {
            catalog,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn check(&self, session: Option<&Session>, required: Tier) -> AccessDecision {
        self.check_at(session, required, self.clock.now())
    }

    /// [`check`](Self::check) at a fixed instant.
    pub fn check_at(
        &self,
        session: Option<&Session>,
        required: Tier,
        now: DateTime<Utc>,
    ) -> AccessDecision {
        let Some(session) = session else {
            return AccessDecision::Deny(DenyReason::NotAuthenticated);
        };

        if !session.is_valid_at(now) {
            return AccessDecision::Deny(DenyReason::Expired);
        }

        if !self.catalog.is_at_least(session.tier, required) {
            return AccessDecision::Deny(DenyReason::InsufficientPlan {
                current: session.tier,
                required,
            });
        }

        AccessDecision::Allow
    }
}
