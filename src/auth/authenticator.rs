//! Login and signup against the contact directory.
//!
//! Stateless: nothing here holds a session. [`SessionManager`] and the HTTP
//! API both build on it.
//!
//! [`SessionManager`]: crate::session::SessionManager

use std::sync::Arc;

use super::credentials::CredentialVerifier;
use crate::contacts::{Contact, ContactDirectory, NewContact, normalize_email};
use crate::error::{PlanGateError, Result};
use crate::plans::{PlanResolver, Tier};

/// A contact together with its resolved tier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedContact {
    pub contact: Contact,
    pub tier: Tier,
}

/// Verifies credentials and creates accounts.
#[derive(Clone)]
pub struct Authenticator {
    directory: Arc<dyn ContactDirectory>,
    credentials: Arc<dyn CredentialVerifier>,
    resolver: PlanResolver,
}

impl Authenticator {
    pub fn new(
        directory: Arc<dyn ContactDirectory>,
        credentials: Arc<dyn CredentialVerifier>,
        resolver: PlanResolver,
    ) -> Self {
        Self {
            directory,
            credentials,
            resolver,
        }
    }

    #[must_use]
    pub fn resolver(&self) -> &PlanResolver {
        &self.resolver
    }

    /// Check an email + credential pair.
    ///
    /// An unknown email is `AccountNotFound` so the caller can offer signup.
    pub async fn authenticate(&self, email: &str, credential: &str) -> Result<ResolvedContact> {
        let email = validated_email(email)?;

        let Some(contact) = self.directory.find_by_email(&email).await? else {
            tracing::info!(target: "plangate.auth.login", "Login for unknown email");
            return Err(PlanGateError::AccountNotFound);
        };

        if !self.credentials.verify(&contact, credential).await? {
            tracing::info!(
                target: "plangate.auth.login",
                contact_id = %contact.id,
                "Invalid credential"
            );
            return Err(PlanGateError::InvalidCredential);
        }

        Ok(self.resolve(contact))
    }

    /// Create a contact on `tier` and enroll its credential.
    ///
    /// An existing email is `AccountAlreadyExists` so the caller can offer
    /// login instead.
    pub async fn register(
        &self,
        email: &str,
        display_name: &str,
        credential: &str,
        tier: Tier,
    ) -> Result<ResolvedContact> {
        let email = validated_email(email)?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(PlanGateError::bad_request("Name is required"));
        }
        self.credentials.check_policy(credential)?;

        if self.directory.find_by_email(&email).await?.is_some() {
            return Err(PlanGateError::AccountAlreadyExists);
        }

        let contact = self
            .directory
            .create(NewContact {
                email,
                display_name: display_name.to_string(),
                tier,
            })
            .await
            .map_err(|e| match e {
                // Lost a race with another signup for the same email.
                PlanGateError::ContactAlreadyExists => PlanGateError::AccountAlreadyExists,
                other => other,
            })?;

        if let Err(e) = self.credentials.enroll(&contact, credential).await {
            tracing::error!(
                target: "plangate.auth.register",
                contact_id = %contact.id,
                error = %e,
                "Contact created but credential enrollment failed"
            );
            return Err(e);
        }

        tracing::info!(
            target: "plangate.auth.register",
            contact_id = %contact.id,
            tier = %tier,
            "Account registered"
        );

        Ok(self.resolve(contact))
    }

    /// Look a contact up without checking any credential.
    pub async fn lookup(&self, email: &str) -> Result<Option<ResolvedContact>> {
        let email = normalize_email(email);
        Ok(self
            .directory
            .find_by_email(&email)
            .await?
            .map(|contact| self.resolve(contact)))
    }

    /// Re-read a known contact and resolve its current tier.
    ///
    /// `AccountNotFound` if the email no longer belongs to `contact_id`.
    pub async fn reresolve(&self, contact_id: &str, email: &str) -> Result<ResolvedContact> {
        match self.lookup(email).await? {
            Some(resolved) if resolved.contact.id == contact_id => Ok(resolved),
            _ => Err(PlanGateError::AccountNotFound),
        }
    }

    /// Retag a contact so it carries exactly `tier`'s plan tag.
    pub async fn change_plan(
        &self,
        contact_id: &str,
        email: &str,
        tier: Tier,
    ) -> Result<ResolvedContact> {
        self.set_tier(contact_id, tier).await?;
        self.reresolve(contact_id, email).await
    }

    /// [`change_plan`](Self::change_plan) without reading the contact back.
    pub async fn set_tier(&self, contact_id: &str, tier: Tier) -> Result<()> {
        let tag = self.resolver.catalog().tag_for_tier(tier).to_string();
        self.directory.set_plan_tags(contact_id, &[tag]).await?;

        tracing::info!(
            target: "plangate.auth.plan_change",
            contact_id = %contact_id,
            tier = %tier,
            "Plan changed"
        );
        Ok(())
    }

    fn resolve(&self, contact: Contact) -> ResolvedContact {
        let tier = self.resolver.resolve(&contact.tags);
        ResolvedContact { contact, tier }
    }
}

fn validated_email(email: &str) -> Result<String> {
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(PlanGateError::bad_request("Invalid email format"));
    }
    Ok(email)
}

/// Basic shape check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credentials::Argon2Credentials;
    use crate::auth::password::{PasswordConfig, PasswordHasher};
    use crate::contacts::InMemoryContactDirectory;

    fn authenticator() -> (Authenticator, InMemoryContactDirectory) {
        let dir = InMemoryContactDirectory::default();
        let creds = Argon2Credentials::new(dir.clone())
            .with_hasher(PasswordHasher::new(PasswordConfig::fast()));
        let auth = Authenticator::new(
            Arc::new(dir.clone()),
            Arc::new(creds),
            PlanResolver::default(),
        );
        (auth, dir)
    }

    #[test]
    fn test_valid_emails() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("user+tag@example.co.uk"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!is_valid_email("userexample.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user@example."));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("us er@example.com"));
    }

    #[tokio::test]
    async fn test_register_then_authenticate() {
        let (auth, _dir) = authenticator();
        let registered = auth
            .register(" New@X.com ", "New User", "password123", Tier::Starter)
            .await
            .unwrap();
        assert_eq!(registered.tier, Tier::Starter);
        assert_eq!(registered.contact.email, "new@x.com");

        let logged_in = auth.authenticate("NEW@x.com", "password123").await.unwrap();
        assert_eq!(logged_in.contact.id, registered.contact.id);
        assert_eq!(logged_in.tier, Tier::Starter);
    }

    #[tokio::test]
    async fn test_unknown_email_is_account_not_found() {
        let (auth, _dir) = authenticator();
        let err = auth.authenticate("ghost@x.com", "password123").await.unwrap_err();
        assert_eq!(err, PlanGateError::AccountNotFound);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (auth, _dir) = authenticator();
        auth.register("a@x.com", "A", "password123", Tier::Free)
            .await
            .unwrap();
        let err = auth.authenticate("a@x.com", "password124").await.unwrap_err();
        assert_eq!(err, PlanGateError::InvalidCredential);
    }

    #[tokio::test]
    async fn test_duplicate_register() {
        let (auth, dir) = authenticator();
        auth.register("a@x.com", "A", "password123", Tier::Free)
            .await
            .unwrap();
        let err = auth
            .register("A@X.COM", "A again", "password123", Tier::Pro)
            .await
            .unwrap_err();
        assert_eq!(err, PlanGateError::AccountAlreadyExists);
        assert_eq!(dir.len().await, 1);
    }

    #[tokio::test]
    async fn test_register_validates_before_creating() {
        let (auth, dir) = authenticator();

        let err = auth
            .register("a@x.com", "A", "short", Tier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanGateError::BadRequest(_)));

        let err = auth
            .register("a@x.com", "   ", "password123", Tier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanGateError::BadRequest(_)));

        let err = auth
            .register("not-an-email", "A", "password123", Tier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanGateError::BadRequest(_)));

        assert!(dir.is_empty().await);
    }

    #[tokio::test]
    async fn test_outage_is_not_account_not_found() {
        let (auth, dir) = authenticator();
        dir.set_offline(true);

        let err = auth.authenticate("a@x.com", "password123").await.unwrap_err();
        assert!(matches!(err, PlanGateError::UpstreamUnavailable(_)));

        let err = auth
            .register("a@x.com", "A", "password123", Tier::Free)
            .await
            .unwrap_err();
        assert!(matches!(err, PlanGateError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_change_plan_replaces_tags() {
        let (auth, dir) = authenticator();
        let registered = auth
            .register("a@x.com", "A", "password123", Tier::Starter)
            .await
            .unwrap();

        let changed = auth
            .change_plan(&registered.contact.id, "a@x.com", Tier::Pro)
            .await
            .unwrap();
        assert_eq!(changed.tier, Tier::Pro);

        // Downgrades work too because the old tag is removed.
        let changed = auth
            .change_plan(&registered.contact.id, "a@x.com", Tier::Free)
            .await
            .unwrap();
        assert_eq!(changed.tier, Tier::Free);

        let stored = dir.get(&registered.contact.id).await.unwrap();
        assert!(!stored.has_tag("siteoptz-plan-starter"));
        assert!(!stored.has_tag("siteoptz-plan-pro"));
    }

    #[tokio::test]
    async fn test_reresolve_after_removal() {
        let (auth, dir) = authenticator();
        let registered = auth
            .register("a@x.com", "A", "password123", Tier::Pro)
            .await
            .unwrap();
        dir.remove(&registered.contact.id).await;

        let err = auth
            .reresolve(&registered.contact.id, "a@x.com")
            .await
            .unwrap_err();
        assert_eq!(err, PlanGateError::AccountNotFound);
    }
}
