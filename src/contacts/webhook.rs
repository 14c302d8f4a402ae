//! Inbound GoHighLevel webhooks: signature check and event payloads.
//!
//! Deliveries are signed with HMAC-SHA256 over the raw request body, sent
//! hex encoded in the `x-ghl-signature` header (an optional `sha256=`
//! prefix is accepted).

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::ghl::custom_field_value;
use crate::error::{PlanGateError, Result};
use crate::plans::Tier;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-ghl-signature";

/// Verifies webhook deliveries against the shared secret.
#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: SecretString,
}

impl WebhookVerifier {
    /// # Errors
    ///
    /// `Internal` if the secret is empty.
    pub fn new(secret: SecretString) -> Result<Self> {
        if secret.expose_secret().trim().is_empty() {
            return Err(PlanGateError::internal("Webhook secret must not be empty"));
        }
        Ok(Self { secret })
    }

    /// Hex signature for `payload`.
    pub fn sign(&self, payload: &[u8]) -> Result<String> {
        Ok(hex::encode(self.mac(payload)?))
    }

    /// # Errors
    ///
    /// `SignatureMismatch` when the signature is missing, undecodable or
    /// does not match.
    pub fn verify(&self, payload: &[u8], signature: Option<&str>) -> Result<()> {
        let signature = signature
            .map(str::trim)
            .map(|s| s.strip_prefix("sha256=").unwrap_or(s))
            .filter(|s| !s.is_empty())
            .ok_or(PlanGateError::SignatureMismatch)?;
        let provided = hex::decode(signature).map_err(|_| PlanGateError::SignatureMismatch)?;

        let expected = self.mac(payload)?;
        if expected.ct_eq(&provided).into() {
            Ok(())
        } else {
            tracing::warn!(target: "plangate.webhooks", "Webhook signature mismatch");
            Err(PlanGateError::SignatureMismatch)
        }
    }

    fn mac(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|e| PlanGateError::internal(format!("Invalid HMAC key: {}", e)))?;
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Contact update delivery. Some triggers omit `oldTags`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactUpdatedEvent {
    #[serde(default)]
    pub id: Option<String>,
    /// Workflow deliveries name the contact here instead of `id`.
    #[serde(default, alias = "contact_id")]
    pub contact_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Absent when the update did not touch tags.
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default, alias = "old_tags")]
    pub old_tags: Option<Vec<String>>,
}

impl ContactUpdatedEvent {
    #[must_use]
    pub fn contact(&self) -> Option<&str> {
        [self.contact_id.as_deref(), self.id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|id| !id.is_empty())
    }
}

/// Won-opportunity delivery.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityWonEvent {
    #[serde(alias = "contact_id")]
    pub contact_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub custom_fields: Value,
}

impl OpportunityWonEvent {
    /// Paid tier the opportunity sells: the `plan` custom field when it
    /// names one, otherwise the highest tier named in the opportunity name.
    #[must_use]
    pub fn purchased_tier(&self) -> Option<Tier> {
        let paid = |tier: &Tier| *tier != Tier::Free;

        if let Some(tier) = custom_field_value(&self.custom_fields, "plan")
            .and_then(|plan| plan.parse::<Tier>().ok())
            .filter(paid)
        {
            return Some(tier);
        }

        self.name
            .as_deref()?
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter_map(|word| word.parse::<Tier>().ok())
            .filter(paid)
            .max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(SecretString::from("whsec-test".to_string())).unwrap()
    }

    #[test]
    fn test_verify_round_trip_and_prefix() {
        let v = verifier();
        let body = br#"{"id":"c1","tags":["pro-plan"]}"#;
        let sig = v.sign(body).unwrap();

        assert!(v.verify(body, Some(&sig)).is_ok());
        assert!(v.verify(body, Some(&format!("sha256={}", sig))).is_ok());
    }

    #[test]
    fn test_verify_rejects_bad_signatures() {
        let v = verifier();
        let body = br#"{"id":"c1"}"#;
        let sig = v.sign(body).unwrap();

        assert_eq!(v.verify(b"{\"id\":\"c2\"}", Some(&sig)), Err(PlanGateError::SignatureMismatch));
        assert_eq!(v.verify(body, None), Err(PlanGateError::SignatureMismatch));
        assert_eq!(v.verify(body, Some("zz")), Err(PlanGateError::SignatureMismatch));
        assert_eq!(v.verify(body, Some("")), Err(PlanGateError::SignatureMismatch));
    }

    #[test]
    fn test_empty_secret_rejected() {
        assert!(WebhookVerifier::new(SecretString::from("  ".to_string())).is_err());
    }

    #[test]
    fn test_contact_updated_field_aliases() {
        let event: ContactUpdatedEvent = serde_json::from_value(json!({
            "contactId": "c1",
            "tags": ["siteoptz-plan-pro"]
        }))
        .unwrap();
        assert_eq!(event.contact(), Some("c1"));
        assert_eq!(event.tags.as_deref(), Some(&["siteoptz-plan-pro".to_string()][..]));
        assert!(event.old_tags.is_none());
    }

    #[test]
    fn test_contact_updated_both_ids() {
        let event: ContactUpdatedEvent = serde_json::from_value(json!({
            "id": "c1",
            "contact_id": "c1",
            "tags": []
        }))
        .unwrap();
        assert_eq!(event.contact(), Some("c1"));

        let event: ContactUpdatedEvent = serde_json::from_value(json!({ "id": " " })).unwrap();
        assert_eq!(event.contact(), None);
        assert!(event.tags.is_none());
    }

    #[test]
    fn test_purchased_tier() {
        let event = |name: &str, fields: Value| OpportunityWonEvent {
            contact_id: "c1".to_string(),
            email: None,
            name: Some(name.to_string()),
            custom_fields: fields,
        };

        assert_eq!(event("Pro annual", Value::Null).purchased_tier(), Some(Tier::Pro));
        assert_eq!(
            event("Upgrade: Starter -> Enterprise", Value::Null).purchased_tier(),
            Some(Tier::Enterprise)
        );
        assert_eq!(
            event("Annual deal", json!({ "plan": "starter" })).purchased_tier(),
            Some(Tier::Starter)
        );
        assert_eq!(
            event("Product demo", json!([{ "key": "plan", "value": "Enterprise" }])).purchased_tier(),
            Some(Tier::Enterprise)
        );
        assert_eq!(event("Free trial", Value::Null).purchased_tier(), None);
        assert_eq!(event("Consulting", Value::Null).purchased_tier(), None);
    }
}
