//! Contact directory: the external CRM that owns identities and plan tags.
//!
//! The rest of the crate only ever talks to a [`ContactDirectory`]; it never
//! caches what the directory returns. Login and signup are rare, and every
//! high-frequency access check works from the cached session instead.

mod config;
mod ghl;
mod memory;
mod webhook;

pub use config::CrmConfig;
pub use ghl::{API_VERSION, DEFAULT_BASE_URL, DEFAULT_TIMEOUT, GhlContactDirectory};
pub use memory::InMemoryContactDirectory;
pub use webhook::{ContactUpdatedEvent, OpportunityWonEvent, SIGNATURE_HEADER, WebhookVerifier};

use crate::error::Result;
use crate::plans::Tier;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// A contact record as normalized from the CRM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    /// Opaque CRM identifier.
    pub id: String,
    /// Lowercased email; the lookup key.
    pub email: String,
    pub display_name: String,
    pub tags: BTreeSet<String>,
}

impl Contact {
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }
}

/// Input for [`ContactDirectory::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: String,
    pub display_name: String,
    /// Tier the new contact is tagged with.
    pub tier: Tier,
}

/// Lookup and mutation of CRM contacts.
///
/// All methods cross a network boundary. Transport failures, upstream
/// authentication failures and timeouts must surface as
/// [`PlanGateError::UpstreamUnavailable`](crate::PlanGateError::UpstreamUnavailable),
/// never as "not found".
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    /// Find a contact by email (case-insensitive).
    async fn find_by_email(&self, email: &str) -> Result<Option<Contact>>;

    /// Create a contact tagged with `new.tier`.
    ///
    /// Fails with `ContactAlreadyExists` if the email is taken. Callers that
    /// want a friendly error should check `find_by_email` first.
    async fn create(&self, new: NewContact) -> Result<Contact>;

    /// Replace the contact's plan tags with `tags`.
    ///
    /// Afterwards the contact carries `tags` and no other plan tag; tags
    /// that are not plan tags are left alone. A failure part-way must leave
    /// the contact with its old plan tags or the new ones, never neither.
    async fn set_plan_tags(&self, contact_id: &str, tags: &[String]) -> Result<()>;
}

#[async_trait]
impl<T: ContactDirectory + ?Sized> ContactDirectory for Arc<T> {
    async fn find_by_email(&self, email: &str) -> Result<Option<Contact>> {
        (**self).find_by_email(email).await
    }

    async fn create(&self, new: NewContact) -> Result<Contact> {
        (**self).create(new).await
    }

    async fn set_plan_tags(&self, contact_id: &str, tags: &[String]) -> Result<()> {
        (**self).set_plan_tags(contact_id, tags).await
    }
}

/// Normalize an email for comparison and storage.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Split a display name into CRM first/last name fields.
pub(crate) fn split_display_name(name: &str) -> (String, String) {
    let name = name.trim();
    match name.split_once(char::is_whitespace) {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (name.to_string(), String::new()),
    }
}
