use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{Contact, ContactDirectory, NewContact, normalize_email};
use crate::auth::CredentialStore;
use crate::error::{PlanGateError, Result};
use crate::plans::PlanCatalog;

#[derive(Clone, Debug)]
struct Record {
    contact: Contact,
    password_hash: Option<String>,
}

/// In-memory contact directory for development and testing.
///
/// Cloning shares the underlying data, so a test can keep a handle and
/// retag or delete contacts behind the back of a session manager.
#[derive(Clone)]
pub struct InMemoryContactDirectory {
    /// contact id -> record
    records: Arc<RwLock<HashMap<String, Record>>>,
    catalog: Arc<PlanCatalog>,
    offline: Arc<AtomicBool>,
}

impl Default for InMemoryContactDirectory {
    fn default() -> Self {
        Self::new(Arc::new(PlanCatalog::default()))
    }
}

impl InMemoryContactDirectory {
    #[must_use]
    pub fn new(catalog: Arc<PlanCatalog>) -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            catalog,
            offline: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate an outage: every call fails with `UpstreamUnavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Insert a contact as-is, bypassing the duplicate check.
    pub async fn insert(&self, mut contact: Contact) {
        contact.email = normalize_email(&contact.email);
        self.records.write().await.insert(
            contact.id.clone(),
            Record {
                contact,
                password_hash: None,
            },
        );
    }

    /// Delete a contact, as if it had been removed in the CRM.
    pub async fn remove(&self, contact_id: &str) -> bool {
        self.records.write().await.remove(contact_id).is_some()
    }

    pub async fn get(&self, contact_id: &str) -> Option<Contact> {
        self.records
            .read()
            .await
            .get(contact_id)
            .map(|r| r.contact.clone())
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PlanGateError::upstream("in-memory directory is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for InMemoryContactDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Contact>> {
        self.ensure_online()?;
        let email = normalize_email(email);
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.contact.email == email)
            .map(|r| r.contact.clone()))
    }

    async fn create(&self, new: NewContact) -> Result<Contact> {
        self.ensure_online()?;
        let email = normalize_email(&new.email);
        let mut records = self.records.write().await;

        if records.values().any(|r| r.contact.email == email) {
            return Err(PlanGateError::ContactAlreadyExists);
        }

        let contact = Contact {
            id: uuid::Uuid::new_v4().to_string(),
            email,
            display_name: new.display_name.trim().to_string(),
            tags: BTreeSet::from([self.catalog.tag_for_tier(new.tier).to_string()]),
        };
        records.insert(
            contact.id.clone(),
            Record {
                contact: contact.clone(),
                password_hash: None,
            },
        );
        Ok(contact)
    }

    async fn set_plan_tags(&self, contact_id: &str, tags: &[String]) -> Result<()> {
        self.ensure_online()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(contact_id)
            .ok_or(PlanGateError::AccountNotFound)?;

        record.contact.tags.retain(|t| !self.catalog.is_plan_tag(t));
        record
            .contact
            .tags
            .extend(tags.iter().map(|t| t.trim().to_ascii_lowercase()));
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for InMemoryContactDirectory {
    async fn password_hash(&self, contact_id: &str) -> Result<Option<String>> {
        self.ensure_online()?;
        let records = self.records.read().await;
        let record = records
            .get(contact_id)
            .ok_or(PlanGateError::AccountNotFound)?;
        Ok(record.password_hash.clone())
    }

    async fn store_password_hash(&self, contact_id: &str, hash: &str) -> Result<()> {
        self.ensure_online()?;
        let mut records = self.records.write().await;
        let record = records
            .get_mut(contact_id)
            .ok_or(PlanGateError::AccountNotFound)?;
        record.password_hash = Some(hash.to_string());
        Ok(())
    }
}
