//! Pluggable credential verification.
//!
//! The session layer only knows [`CredentialVerifier`]. The provided
//! [`Argon2Credentials`] keeps Argon2id hashes in any [`CredentialStore`];
//! the GoHighLevel directory stores them in a contact custom field.

use async_trait::async_trait;
use std::sync::Arc;

use super::password::{PasswordHasher, PasswordPolicy};
use crate::contacts::Contact;
use crate::error::{PlanGateError, Result};

/// Where password hashes live, keyed by contact id.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// The stored hash, or `None` if the contact never enrolled one.
    async fn password_hash(&self, contact_id: &str) -> Result<Option<String>>;

    async fn store_password_hash(&self, contact_id: &str, hash: &str) -> Result<()>;
}

#[async_trait]
impl<T: CredentialStore + ?Sized> CredentialStore for Arc<T> {
    async fn password_hash(&self, contact_id: &str) -> Result<Option<String>> {
        (**self).password_hash(contact_id).await
    }

    async fn store_password_hash(&self, contact_id: &str, hash: &str) -> Result<()> {
        (**self).store_password_hash(contact_id, hash).await
    }
}

/// Checks and enrolls user credentials.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    /// `Ok(false)` means the credential is wrong. Errors are reserved for
    /// failures to check at all (e.g. the store is unreachable).
    async fn verify(&self, contact: &Contact, credential: &str) -> Result<bool>;

    /// Store a credential for a contact.
    async fn enroll(&self, contact: &Contact, credential: &str) -> Result<()>;

    /// Reject an unacceptable credential up front, before anything is created.
    fn check_policy(&self, _credential: &str) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl<T: CredentialVerifier + ?Sized> CredentialVerifier for Arc<T> {
    async fn verify(&self, contact: &Contact, credential: &str) -> Result<bool> {
        (**self).verify(contact, credential).await
    }

    async fn enroll(&self, contact: &Contact, credential: &str) -> Result<()> {
        (**self).enroll(contact, credential).await
    }

    fn check_policy(&self, credential: &str) -> Result<()> {
        (**self).check_policy(credential)
    }
}

/// Argon2id password credentials over a [`CredentialStore`].
///
/// A contact without a stored hash never verifies.
pub struct Argon2Credentials<S: CredentialStore> {
    store: S,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
}

impl<S: CredentialStore> Argon2Credentials<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            hasher: PasswordHasher::default(),
            policy: PasswordPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PasswordPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn hash(&self, credential: &str) -> Result<String> {
        let hasher = self.hasher.clone();
        let credential = credential.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&credential))
            .await
            .map_err(|e| PlanGateError::internal(format!("Hashing task failed: {}", e)))?
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialVerifier for Argon2Credentials<S> {
    async fn verify(&self, contact: &Contact, credential: &str) -> Result<bool> {
        let Some(stored) = self.store.password_hash(&contact.id).await? else {
            let hasher = self.hasher.clone();
            let credential = credential.to_string();
            let _ = tokio::task::spawn_blocking(move || hasher.verify_dummy(&credential)).await;

            tracing::warn!(
                target: "plangate.auth.credentials",
                contact_id = %contact.id,
                "Contact has no enrolled credential"
            );
            return Ok(false);
        };

        let hasher = self.hasher.clone();
        let candidate = credential.to_string();
        let hash = stored.clone();
        let matches = tokio::task::spawn_blocking(move || hasher.verify(&candidate, &hash))
            .await
            .map_err(|e| PlanGateError::internal(format!("Verification task failed: {}", e)))??;

        if matches && self.hasher.needs_rehash(&stored).unwrap_or(false) {
            match self.hash(credential).await {
                Ok(rehashed) => {
                    if let Err(e) = self.store.store_password_hash(&contact.id, &rehashed).await {
                        tracing::warn!(
                            target: "plangate.auth.credentials",
                            contact_id = %contact.id,
                            error = %e,
                            "Failed to store upgraded password hash"
                        );
                    }
                }
                Err(e) => tracing::warn!(
                    target: "plangate.auth.credentials",
                    error = %e,
                    "Failed to rehash password"
                ),
            }
        }

        Ok(matches)
    }

    async fn enroll(&self, contact: &Contact, credential: &str) -> Result<()> {
        self.policy.check(credential)?;
        let hash = self.hash(credential).await?;
        self.store.store_password_hash(&contact.id, &hash).await
    }

    fn check_policy(&self, credential: &str) -> Result<()> {
        self.policy.check(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordConfig;
    use crate::contacts::{ContactDirectory, InMemoryContactDirectory, NewContact};
    use crate::plans::Tier;

    async fn setup() -> (InMemoryContactDirectory, Contact) {
        let dir = InMemoryContactDirectory::default();
        let contact = dir
            .create(NewContact {
                email: "a@x.com".into(),
                display_name: "A".into(),
                tier: Tier::Free,
            })
            .await
            .unwrap();
        (dir, contact)
    }

    fn credentials(dir: InMemoryContactDirectory) -> Argon2Credentials<InMemoryContactDirectory> {
        Argon2Credentials::new(dir).with_hasher(PasswordHasher::new(PasswordConfig::fast()))
    }

    #[tokio::test]
    async fn test_enroll_then_verify() {
        let (dir, contact) = setup().await;
        let creds = credentials(dir);

        creds.enroll(&contact, "correct horse").await.unwrap();
        assert!(creds.verify(&contact, "correct horse").await.unwrap());
        assert!(!creds.verify(&contact, "wrong horse").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_hash_never_verifies() {
        let (dir, contact) = setup().await;
        let creds = credentials(dir);

        assert!(!creds.verify(&contact, "anything at all").await.unwrap());
        assert!(!creds.verify(&contact, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_enroll_applies_policy() {
        let (dir, contact) = setup().await;
        let creds = credentials(dir.clone());

        let err = creds.enroll(&contact, "short").await.unwrap_err();
        assert!(matches!(err, PlanGateError::BadRequest(_)));
        assert!(dir.password_hash(&contact.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_verify_upgrades_old_hash() {
        let (dir, contact) = setup().await;
        let old = PasswordHasher::new(PasswordConfig::new(2048, 1, 1));
        dir.store_password_hash(&contact.id, &old.hash("correct horse").unwrap())
            .await
            .unwrap();

        let creds = credentials(dir.clone());
        assert!(creds.verify(&contact, "correct horse").await.unwrap());

        let upgraded = dir.password_hash(&contact.id).await.unwrap().unwrap();
        assert!(upgraded.contains("m=1024"));
    }

    #[tokio::test]
    async fn test_store_outage_is_an_error() {
        let (dir, contact) = setup().await;
        let creds = credentials(dir.clone());
        dir.set_offline(true);

        let err = creds.verify(&contact, "whatever1").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
