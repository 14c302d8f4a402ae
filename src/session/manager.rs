//! Client-side session lifecycle.
//!
//! One [`SessionManager`] owns one storage slot. It moves between
//! [`SessionState`]s as the user logs in, signs up, refreshes, changes plan,
//! runs out of time or logs out:
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated -> Expired | LoggedOut
//!     ^              |                  |
//!     +--- failure --+                  +-- logout -> Anonymous
//! ```
//!
//! Mutating operations are serialized; a failed operation leaves the state
//! it started from, so calling it again is always safe.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use super::storage::SessionStorage;
use super::types::{Session, SessionState};
use crate::auth::{Authenticator, ResolvedContact};
use crate::clock::{Clock, SystemClock};
use crate::contacts::Contact;
use crate::error::{PlanGateError, Result};
use crate::plans::Tier;
use crate::sso::{SsoToken, SsoTokenCodec};

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct Inner {
    state: SessionState,
    session: Option<Session>,
}

pub struct SessionManager {
    authenticator: Authenticator,
    codec: Option<SsoTokenCodec>,
    storage: Arc<dyn SessionStorage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    inner: RwLock<Inner>,
    op_lock: Mutex<()>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.state())
            .field("ttl", &self.ttl)
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(authenticator: Authenticator, storage: Arc<dyn SessionStorage>) -> Self {
        Self {
            authenticator,
            codec: None,
            storage,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_SESSION_TTL,
            inner: RwLock::new(Inner::default()),
            op_lock: Mutex::new(()),
        }
    }

    /// # Errors
    ///
    /// `Internal` for a zero TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Result<Self> {
        if ttl.is_zero() {
            return Err(PlanGateError::internal("Session TTL must be positive"));
        }
        self.ttl = ttl;
        Ok(self)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enables [`login_with_sso`](Self::login_with_sso).
    #[must_use]
    pub fn with_sso(mut self, codec: SsoTokenCodec) -> Self {
        self.codec = Some(codec);
        self
    }

    pub fn state(&self) -> SessionState {
        self.read_inner(|inner| inner.state)
    }

    /// `now < expires_at`
    pub fn is_valid(&self, session: &Session) -> bool {
        session.is_valid_at(self.clock.now())
    }

    /// Log in with an email and credential.
    ///
    /// `AccountNotFound` and `InvalidCredential` are distinct so the caller
    /// can offer signup or a retry respectively.
    pub async fn login(&self, email: &str, credential: &str) -> Result<Session> {
        let _op = self.op_lock.lock().await;
        let previous = self.begin_authenticating();

        let result = match self.authenticator.authenticate(email, credential).await {
            Ok(resolved) => self.establish(&resolved.contact, resolved.tier).await,
            Err(e) => Err(e),
        };

        self.finish("login", previous, result)
    }

    /// Create an account on `tier` and log straight into it.
    pub async fn signup(
        &self,
        email: &str,
        display_name: &str,
        credential: &str,
        tier: Tier,
    ) -> Result<Session> {
        let _op = self.op_lock.lock().await;
        let previous = self.begin_authenticating();

        let result = match self
            .authenticator
            .register(email, display_name, credential, tier)
            .await
        {
            Ok(resolved) => self.establish(&resolved.contact, resolved.tier).await,
            Err(e) => Err(e),
        };

        self.finish("signup", previous, result)
    }

    /// Log in with a signed token handed over by another context.
    ///
    /// The session gets the tier carried in the token, but the contact must
    /// still exist under the same id.
    pub async fn login_with_sso(&self, token: &SsoToken, audience: &str) -> Result<Session> {
        let codec = self
            .codec
            .as_ref()
            .ok_or_else(|| PlanGateError::internal("SSO login is not configured"))?;

        let _op = self.op_lock.lock().await;
        let previous = self.begin_authenticating();

        let result = match codec.verify(token, audience) {
            Ok(payload) => match self.authenticator.lookup(&payload.email).await {
                Ok(Some(ResolvedContact { contact, .. })) if contact.id == payload.contact_id => {
                    self.establish(&contact, payload.tier).await
                }
                Ok(_) => Err(PlanGateError::AccountNotFound),
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        self.finish("sso", previous, result)
    }

    /// Re-read the contact's tags and update the session tier in place.
    ///
    /// A contact that no longer exists ends the session: storage is cleared,
    /// the state becomes `LoggedOut` and `AccountNotFound` is returned.
    pub async fn refresh_from_upstream(&self) -> Result<Session> {
        let _op = self.op_lock.lock().await;
        let session = self.live_session().await?;

        match self
            .authenticator
            .reresolve(&session.contact_id, &session.email)
            .await
        {
            Ok(resolved) => {
                let refreshed = session.refreshed(&resolved.contact, resolved.tier);
                self.persist(&refreshed).await?;
                self.set_authenticated(refreshed.clone());

                if refreshed.tier != session.tier {
                    tracing::info!(
                        target: "plangate.session.refresh",
                        contact_id = %refreshed.contact_id,
                        from = %session.tier,
                        to = %refreshed.tier,
                        "Tier changed upstream"
                    );
                }
                Ok(refreshed)
            }
            Err(PlanGateError::AccountNotFound) => {
                tracing::warn!(
                    target: "plangate.session.refresh",
                    contact_id = %session.contact_id,
                    "Contact no longer exists, logging out"
                );
                self.clear_storage("refresh").await;
                self.set_state(SessionState::LoggedOut, None);
                Err(PlanGateError::AccountNotFound)
            }
            Err(e) => {
                tracing::warn!(
                    target: "plangate.session.refresh",
                    error = %e,
                    "Refresh failed, keeping current session"
                );
                Err(e)
            }
        }
    }

    /// Move the contact to `tier` and update the session in place.
    pub async fn change_plan(&self, tier: Tier) -> Result<Session> {
        let _op = self.op_lock.lock().await;
        let session = self.live_session().await?;

        let resolved = self
            .authenticator
            .change_plan(&session.contact_id, &session.email, tier)
            .await?;

        let updated = session.refreshed(&resolved.contact, resolved.tier);
        self.persist(&updated).await?;
        self.set_authenticated(updated.clone());
        Ok(updated)
    }

    /// The live session, if any.
    ///
    /// An expired session is never returned: it is removed from storage and
    /// the state becomes `Expired`.
    pub async fn current(&self) -> Option<Session> {
        let _op = self.op_lock.lock().await;
        self.live_session().await.ok()
    }

    /// Re-read the storage slot after another context changed it.
    pub async fn sync_from_storage(&self) -> SessionState {
        let _op = self.op_lock.lock().await;

        let raw = match self.storage.read().await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    target: "plangate.session.sync",
                    error = %e,
                    "Could not read session storage"
                );
                return self.state();
            }
        };

        let Some(raw) = raw else {
            self.set_state(SessionState::Anonymous, None);
            return SessionState::Anonymous;
        };

        let session = match serde_json::from_str::<Session>(&raw) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    target: "plangate.session.sync",
                    error = %e,
                    "Discarding unreadable stored session"
                );
                self.clear_storage("sync").await;
                self.set_state(SessionState::Anonymous, None);
                return SessionState::Anonymous;
            }
        };

        if self.is_valid(&session) {
            self.set_authenticated(session);
            SessionState::Authenticated
        } else {
            self.clear_storage("sync").await;
            self.set_state(SessionState::Expired, None);
            SessionState::Expired
        }
    }

    /// Forget the session. Safe to call in any state.
    pub async fn logout(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;
        self.storage.clear().await?;

        let contact_id = self.read_inner(|inner| inner.session.as_ref().map(|s| s.contact_id.clone()));
        self.set_state(SessionState::Anonymous, None);

        if let Some(contact_id) = contact_id {
            tracing::info!(target: "plangate.session.logout", contact_id = %contact_id, "Logged out");
        }
        Ok(())
    }

    /// Follow storage changes made by other managers sharing the slot.
    ///
    /// The task ends once the manager is dropped or the slot goes away.
    pub fn spawn_storage_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.storage.subscribe();
        let manager = Arc::downgrade(self);

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let state = manager.sync_from_storage().await;
                tracing::debug!(target: "plangate.session.sync", ?state, "Storage changed");
            }
        })
    }

    async fn establish(&self, contact: &Contact, tier: Tier) -> Result<Session> {
        let session = Session::start(contact, tier, self.clock.now(), self.ttl)?;
        self.persist(&session).await?;
        self.set_authenticated(session.clone());
        Ok(session)
    }

    async fn persist(&self, session: &Session) -> Result<()> {
        let raw = serde_json::to_string(session)
            .map_err(|e| PlanGateError::internal(format!("Session serialization failed: {}", e)))?;
        self.storage.write(&raw).await
    }

    /// Current session after the expiry check; errors name why there is none.
    async fn live_session(&self) -> Result<Session> {
        let (state, session) = self.read_inner(|inner| (inner.state, inner.session.clone()));

        let Some(session) = session else {
            return Err(match state {
                SessionState::Expired => PlanGateError::Expired,
                _ => PlanGateError::NotAuthenticated,
            });
        };

        if self.is_valid(&session) {
            return Ok(session);
        }

        tracing::info!(
            target: "plangate.session.expiry",
            contact_id = %session.contact_id,
            "Session expired"
        );
        self.clear_storage("expiry").await;
        self.set_state(SessionState::Expired, None);
        Err(PlanGateError::Expired)
    }

    async fn clear_storage(&self, during: &'static str) {
        // Dropped from memory regardless; the next sync retries the slot.
        if let Err(e) = self.storage.clear().await {
            tracing::warn!(
                target: "plangate.session",
                during,
                error = %e,
                "Could not clear session storage"
            );
        }
    }

    fn begin_authenticating(&self) -> SessionState {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut inner.state, SessionState::Authenticating)
    }

    fn finish(
        &self,
        op: &'static str,
        previous: SessionState,
        result: Result<Session>,
    ) -> Result<Session> {
        match &result {
            Ok(session) => {
                tracing::info!(
                    target: "plangate.session",
                    op,
                    contact_id = %session.contact_id,
                    tier = %session.tier,
                    "Session established"
                );
            }
            Err(e) => {
                // A failed attempt never grants access; fall back to wherever
                // we were before it started.
                self.inner
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .state = previous;
                tracing::info!(
                    target: "plangate.session",
                    op,
                    code = e.code(),
                    retryable = e.is_retryable(),
                    "Authentication failed"
                );
            }
        }
        result
    }

    fn set_authenticated(&self, session: Session) {
        self.set_state(SessionState::Authenticated, Some(session));
    }

    fn set_state(&self, state: SessionState, session: Option<Session>) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.state = state;
        inner.session = session;
    }

    fn read_inner<T>(&self, f: impl FnOnce(&Inner) -> T) -> T {
        f(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }
}
