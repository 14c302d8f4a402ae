//! Signed, short-lived tokens carrying a session's identity and tier.
//!
//! Wire format: `token` is the base64url (unpadded) JSON payload and
//! `signature` is the lowercase hex HMAC-SHA256 of those exact payload
//! bytes. Verification recomputes the MAC over the received bytes, so
//! the payload never needs re-serializing.
//!
//! ```rust,ignore
//! let codec = SsoTokenCodec::new(SecretString::from(secret))?;
//! let token = codec.issue(&session, "enterprise_overview")?;
//! let payload = codec.verify(&token, "enterprise_overview")?;
//! assert_eq!(payload.email, session.email);
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::clock::{Clock, SystemClock};
use crate::error::{PlanGateError, Result};
use crate::plans::Tier;
use crate::session::Session;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(5 * 60);

/// Audience used for API session tokens, as opposed to dashboard ids.
pub const SESSION_AUDIENCE: &str = "session";

/// Signed claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoPayload {
    pub email: String,
    pub contact_id: String,
    pub name: String,
    pub tier: Tier,
    /// Dashboard id (or [`SESSION_AUDIENCE`]) the token is valid for.
    pub audience: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,
    pub nonce: String,
}

impl SsoPayload {
    /// Rebuild the session a [`SESSION_AUDIENCE`] token was issued for.
    #[must_use]
    pub fn into_session(self) -> Session {
        Session {
            contact_id: self.contact_id,
            email: self.email,
            display_name: self.name,
            tier: self.tier,
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

/// A token as it travels: the encoded payload plus its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsoToken {
    pub token: String,
    pub signature: String,
}

impl SsoToken {
    /// `(name, value)` pairs for an embed URL query string.
    #[must_use]
    pub fn query_pairs(&self) -> [(&'static str, &str); 2] {
        [("token", &self.token), ("signature", &self.signature)]
    }

    /// `<token>.<signature>`, for an `Authorization: Bearer` header.
    #[must_use]
    pub fn to_bearer(&self) -> String {
        format!("{}.{}", self.token, self.signature)
    }

    /// Parse the [`to_bearer`](Self::to_bearer) form.
    pub fn from_bearer(value: &str) -> Result<Self> {
        let (token, signature) = value
            .trim()
            .split_once('.')
            .ok_or(PlanGateError::SignatureMismatch)?;
        if token.is_empty() || signature.is_empty() {
            return Err(PlanGateError::SignatureMismatch);
        }
        Ok(Self {
            token: token.to_string(),
            signature: signature.to_string(),
        })
    }
}

/// Issues and verifies [`SsoToken`]s with a shared HMAC secret.
#[derive(Clone, Debug)]
pub struct SsoTokenCodec {
    secret: SecretString,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl SsoTokenCodec {
    /// # Errors
    ///
    /// `Internal` if the secret is empty.
    pub fn new(secret: SecretString) -> Result<Self> {
        if secret.expose_secret().is_empty() {
            return Err(PlanGateError::internal("SSO secret must not be empty"));
        }
        Ok(Self {
            secret,
            ttl: to_chrono(DEFAULT_TOKEN_TTL)?,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Result<Self> {
        if ttl.is_zero() {
            return Err(PlanGateError::internal("SSO token TTL must be positive"));
        }
        self.ttl = to_chrono(ttl)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Token for one dashboard, valid for the configured TTL.
    pub fn issue(&self, session: &Session, audience: &str) -> Result<SsoToken> {
        self.issue_with_claims(session, audience).map(|(token, _)| token)
    }

    /// Like [`issue`](Self::issue), also returning the signed claims.
    pub fn issue_with_claims(
        &self,
        session: &Session,
        audience: &str,
    ) -> Result<(SsoToken, SsoPayload)> {
        let now = self.clock.now();
        self.sign(session, audience, now, now + self.ttl)
    }

    /// Token standing in for the whole session; expires with it.
    pub fn issue_for_session(&self, session: &Session) -> Result<SsoToken> {
        self.sign(
            session,
            SESSION_AUDIENCE,
            self.clock.now(),
            session.expires_at,
        )
        .map(|(token, _)| token)
    }

    /// Check a token's signature, then its expiry, then its audience.
    pub fn verify(&self, token: &SsoToken, expected_audience: &str) -> Result<SsoPayload> {
        let payload_bytes = URL_SAFE_NO_PAD
            .decode(token.token.as_bytes())
            .map_err(|_| PlanGateError::SignatureMismatch)?;
        let provided = hex::decode(token.signature.trim())
            .map_err(|_| PlanGateError::SignatureMismatch)?;

        let expected = self.mac(&payload_bytes)?;
        if !constant_time_compare(&expected, &provided) {
            tracing::debug!(target: "plangate.sso.verify", "Token signature mismatch");
            return Err(PlanGateError::SignatureMismatch);
        }

        let payload: SsoPayload = serde_json::from_slice(&payload_bytes)
            .map_err(|_| PlanGateError::SignatureMismatch)?;

        if self.clock.now() > payload.expires_at {
            tracing::debug!(
                target: "plangate.sso.verify",
                audience = %payload.audience,
                "Token expired"
            );
            return Err(PlanGateError::Expired);
        }

        if payload.audience != expected_audience {
            tracing::warn!(
                target: "plangate.sso.verify",
                audience = %payload.audience,
                expected = %expected_audience,
                "Token presented to the wrong audience"
            );
            return Err(PlanGateError::AudienceMismatch);
        }

        Ok(payload)
    }

    fn sign(
        &self,
        session: &Session,
        audience: &str,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<(SsoToken, SsoPayload)> {
        let payload = SsoPayload {
            email: session.email.clone(),
            contact_id: session.contact_id.clone(),
            name: session.display_name.clone(),
            tier: session.tier,
            audience: audience.to_string(),
            issued_at,
            expires_at,
            nonce: new_nonce(),
        };

        let bytes = serde_json::to_vec(&payload)?;
        let signature = hex::encode(self.mac(&bytes)?);

        let token = SsoToken {
            token: URL_SAFE_NO_PAD.encode(&bytes),
            signature,
        };
        Ok((token, payload))
    }

    fn mac(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| PlanGateError::internal(format!("Invalid HMAC key: {}", e)))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn new_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn to_chrono(ttl: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(ttl).map_err(|_| PlanGateError::internal("TTL out of range"))
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn session() -> Session {
        let now = Utc::now();
        Session {
            contact_id: "c1".to_string(),
            email: "a@x.com".to_string(),
            display_name: "Ada".to_string(),
            tier: Tier::Pro,
            issued_at: now,
            expires_at: now + chrono::Duration::hours(24),
        }
    }

    fn codec(clock: &ManualClock) -> SsoTokenCodec {
        SsoTokenCodec::new(SecretString::from("shared-secret".to_string()))
            .unwrap()
            .with_clock(Arc::new(clock.clone()))
    }

    #[test]
    fn test_issue_then_verify() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let session = session();

        let token = codec.issue(&session, "team_dashboard").unwrap();
        let payload = codec.verify(&token, "team_dashboard").unwrap();

        assert_eq!(payload.email, session.email);
        assert_eq!(payload.tier, session.tier);
        assert_eq!(payload.contact_id, "c1");
        assert_eq!(payload.audience, "team_dashboard");
        assert_eq!(payload.expires_at - payload.issued_at, chrono::Duration::minutes(5));
    }

    #[test]
    fn test_signature_is_lowercase_hex_and_token_is_unpadded() {
        let clock = ManualClock::starting_now();
        let token = codec(&clock).issue(&session(), "d").unwrap();

        assert_eq!(token.signature.len(), 64);
        assert!(token.signature.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert!(!token.token.contains('='));
        assert!(!token.token.contains('+') && !token.token.contains('/'));
    }

    #[test]
    fn test_nonce_is_fresh() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let a = codec.verify(&codec.issue(&session(), "d").unwrap(), "d").unwrap();
        let b = codec.verify(&codec.issue(&session(), "d").unwrap(), "d").unwrap();
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_flipping_any_payload_byte_is_signature_mismatch() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let token = codec.issue(&session(), "d").unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(&token.token).unwrap();

        for i in 0..bytes.len() {
            let mut tampered = bytes.clone();
            tampered[i] ^= 0x01;
            let forged = SsoToken {
                token: URL_SAFE_NO_PAD.encode(&tampered),
                signature: token.signature.clone(),
            };
            assert_eq!(
                codec.verify(&forged, "d").unwrap_err(),
                PlanGateError::SignatureMismatch,
                "byte {} flipped",
                i
            );
        }
    }

    #[test]
    fn test_expired_token_with_valid_signature() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let token = codec.issue(&session(), "d").unwrap();

        clock.advance(chrono::Duration::minutes(5) + chrono::Duration::seconds(1));
        assert_eq!(codec.verify(&token, "d").unwrap_err(), PlanGateError::Expired);
    }

    #[test]
    fn test_tampered_and_expired_reports_signature_first() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let mut token = codec.issue(&session(), "d").unwrap();
        token.signature = "00".repeat(32);

        clock.advance(chrono::Duration::hours(1));
        assert_eq!(
            codec.verify(&token, "d").unwrap_err(),
            PlanGateError::SignatureMismatch
        );
    }

    #[test]
    fn test_audience_mismatch() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let token = codec.issue(&session(), "basic_analytics").unwrap();

        assert_eq!(
            codec.verify(&token, "enterprise_overview").unwrap_err(),
            PlanGateError::AudienceMismatch
        );
    }

    #[test]
    fn test_other_secret_rejects() {
        let clock = ManualClock::starting_now();
        let token = codec(&clock).issue(&session(), "d").unwrap();

        let other = SsoTokenCodec::new(SecretString::from("other-secret".to_string()))
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        assert_eq!(
            other.verify(&token, "d").unwrap_err(),
            PlanGateError::SignatureMismatch
        );
    }

    #[test]
    fn test_undecodable_parts_are_signature_mismatch() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let token = codec.issue(&session(), "d").unwrap();

        let bad_sig = SsoToken {
            token: token.token.clone(),
            signature: "not-hex".to_string(),
        };
        assert_eq!(codec.verify(&bad_sig, "d").unwrap_err(), PlanGateError::SignatureMismatch);

        let bad_token = SsoToken {
            token: "***".to_string(),
            signature: token.signature.clone(),
        };
        assert_eq!(codec.verify(&bad_token, "d").unwrap_err(), PlanGateError::SignatureMismatch);
    }

    #[test]
    fn test_session_token_expires_with_session() {
        let clock = ManualClock::starting_now();
        let codec = codec(&clock);
        let session = session();

        let token = codec.issue_for_session(&session).unwrap();
        let restored = codec.verify(&token, SESSION_AUDIENCE).unwrap().into_session();
        assert_eq!(restored.email, session.email);
        assert_eq!(restored.expires_at.timestamp(), session.expires_at.timestamp());
    }

    #[test]
    fn test_bearer_round_trip() {
        let clock = ManualClock::starting_now();
        let token = codec(&clock).issue(&session(), "d").unwrap();
        assert_eq!(SsoToken::from_bearer(&token.to_bearer()).unwrap(), token);
        assert!(SsoToken::from_bearer("no-dot-here").is_err());
        assert!(SsoToken::from_bearer(".sig").is_err());
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(SsoTokenCodec::new(SecretString::from(String::new())).is_err());
    }
}
