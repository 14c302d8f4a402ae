use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::contacts::Contact;
use crate::error::{PlanGateError, Result};
use crate::plans::Tier;

/// An authenticated client session.
///
/// Persisted as `{contactId, email, displayName, tier, issuedAt, expiresAt}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub contact_id: String,
    pub email: String,
    pub display_name: String,
    pub tier: Tier,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start a session for `contact` at `now`, lasting `ttl`.
    ///
    /// # Errors
    ///
    /// `Internal` for a zero or out-of-range TTL.
    pub fn start(contact: &Contact, tier: Tier, now: DateTime<Utc>, ttl: Duration) -> Result<Self> {
        if ttl.is_zero() {
            return Err(PlanGateError::internal("Session TTL must be positive"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| PlanGateError::internal("Session TTL out of range"))?;

        Ok(Self {
            contact_id: contact.id.clone(),
            email: contact.email.clone(),
            display_name: contact.display_name.clone(),
            tier,
            issued_at: now,
            expires_at: now + ttl,
        })
    }

    /// `now < expires_at`
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left before expiry, zero once expired.
    #[must_use]
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Same session (same expiry) with a fresh view of the contact.
    #[must_use]
    pub fn refreshed(&self, contact: &Contact, tier: Tier) -> Self {
        Self {
            email: contact.email.clone(),
            display_name: contact.display_name.clone(),
            tier,
            ..self.clone()
        }
    }
}

/// Where a client's session lifecycle currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Anonymous,
    /// A login or signup is in flight.
    Authenticating,
    Authenticated,
    /// The stored session ran out; the user must sign in again.
    Expired,
    /// The contact disappeared from the directory.
    LoggedOut,
}
