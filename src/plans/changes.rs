//! Tier transitions pushed from the CRM, and the log that applies them to
//! sessions issued before the change.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{DashboardCatalog, Tier};
use crate::session::Session;

/// Direction of a tier change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanChange {
    Unchanged,
    Upgrade,
    /// Dashboards above the new tier are revoked.
    Downgrade,
}

/// What a move from one tier to another grants and takes away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanTransition {
    pub previous: Tier,
    pub current: Tier,
    pub change: PlanChange,
    pub granted_dashboards: Vec<String>,
    pub revoked_dashboards: Vec<String>,
}

impl PlanTransition {
    #[must_use]
    pub fn between(previous: Tier, current: Tier, dashboards: &DashboardCatalog) -> Self {
        let change = match current.cmp(&previous) {
            std::cmp::Ordering::Greater => PlanChange::Upgrade,
            std::cmp::Ordering::Less => PlanChange::Downgrade,
            std::cmp::Ordering::Equal => PlanChange::Unchanged,
        };

        let opened_by = |tier: Tier| -> Vec<String> {
            dashboards
                .available_for(tier)
                .into_iter()
                .map(|d| d.id.clone())
                .collect()
        };
        let before = opened_by(previous);
        let after = opened_by(current);

        Self {
            previous,
            current,
            change,
            granted_dashboards: after.iter().filter(|id| !before.contains(id)).cloned().collect(),
            revoked_dashboards: before.iter().filter(|id| !after.contains(id)).cloned().collect(),
        }
    }

    #[must_use]
    pub fn is_change(&self) -> bool {
        self.change != PlanChange::Unchanged
    }
}

#[derive(Debug, Clone, Copy)]
struct Recorded {
    tier: Tier,
    at: DateTime<Utc>,
}

/// Latest tier known per contact, with when it was learned.
///
/// Session tokens carry the tier they were issued with; [`apply`](Self::apply)
/// replaces it when a newer tier was recorded after the token was issued.
#[derive(Debug, Default)]
pub struct PlanChangeLog {
    entries: RwLock<HashMap<String, Recorded>>,
}

impl PlanChangeLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, contact_id: &str, tier: Tier, at: DateTime<Utc>) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(contact_id.to_string())
            .or_insert(Recorded { tier, at });
        // Out-of-order deliveries never roll a newer record back.
        if at >= entry.at {
            *entry = Recorded { tier, at };
        }
    }

    #[must_use]
    pub fn latest(&self, contact_id: &str) -> Option<(Tier, DateTime<Utc>)> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(contact_id)
            .map(|r| (r.tier, r.at))
    }

    /// Bring `session` up to the latest recorded tier. Returns whether it
    /// changed.
    pub fn apply(&self, session: &mut Session) -> bool {
        match self.latest(&session.contact_id) {
            Some((tier, at)) if at > session.issued_at && tier != session.tier => {
                session.tier = tier;
                true
            }
            _ => false,
        }
    }
}
