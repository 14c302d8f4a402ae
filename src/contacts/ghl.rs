//! GoHighLevel (LeadConnector) contact directory.
//!
//! Talks to the v2 REST API:
//!
//! - `GET  /contacts/?query=<email>&locationId=<location>` to look up
//! - `POST /contacts/` to create
//! - `POST /contacts/{id}/tags` then `DELETE /contacts/{id}/tags` to retag
//! - `GET /contacts/{id}` and `PUT /contacts/{id}` for the password hash
//!   custom field
//!
//! Every request carries `Authorization: Bearer <key>` and the pinned
//! `Version` header, and is bounded by the client timeout.

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{Contact, ContactDirectory, NewContact, normalize_email, split_display_name};
use crate::auth::CredentialStore;
use super::CrmConfig;
use crate::error::{PlanGateError, Result};
use crate::plans::PlanCatalog;

/// Public API host.
pub const DEFAULT_BASE_URL: &str = "https://services.leadconnectorhq.com";

/// API version sent in the `Version` header.
pub const API_VERSION: &str = "2021-07-28";

/// Default upper bound for a single upstream request.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Custom field holding the password hash.
pub const DEFAULT_PASSWORD_FIELD: &str = "password_hash";

/// [`ContactDirectory`] backed by the GoHighLevel contacts API.
#[derive(Clone, Debug)]
pub struct GhlContactDirectory {
    client: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    location_id: String,
    password_field: String,
    catalog: Arc<PlanCatalog>,
}

impl GhlContactDirectory {
    /// Create a directory client with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` if `base_url` is not an absolute URL.
    pub fn new(
        base_url: &str,
        api_key: SecretString,
        location_id: impl Into<String>,
        catalog: Arc<PlanCatalog>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PlanGateError::bad_request(format!("Invalid CRM base URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PlanGateError::bad_request("Invalid CRM base URL"));
        }

        Ok(Self {
            client: Self::build_client(DEFAULT_TIMEOUT)?,
            base_url,
            api_key,
            location_id: location_id.into(),
            password_field: DEFAULT_PASSWORD_FIELD.to_string(),
            catalog,
        })
    }

    /// Create a directory client from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if the API key or location id is missing.
    pub fn from_config(config: &CrmConfig, catalog: Arc<PlanCatalog>) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| PlanGateError::internal("GHL_API_KEY is not configured"))?;
        let location_id = config
            .location_id
            .clone()
            .filter(|l| !l.is_empty())
            .ok_or_else(|| PlanGateError::internal("GHL_LOCATION_ID is not configured"))?;

        Ok(
            Self::new(&config.base_url, api_key, location_id, catalog)?
                .with_timeout(config.timeout())?
                .with_password_field(config.password_field.clone()),
        )
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Self::build_client(timeout)?;
        Ok(self)
    }

    /// Use a different custom field for the password hash.
    #[must_use]
    pub fn with_password_field(mut self, field: impl Into<String>) -> Self {
        self.password_field = field.into();
        self
    }

    fn build_client(timeout: Duration) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("plangate/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlanGateError::internal(format!("Failed to build HTTP client: {}", e)))
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| PlanGateError::internal("CRM base URL cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(self.api_key.expose_secret())
            .header("Version", API_VERSION)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    async fn fetch_contact(&self, contact_id: &str) -> Result<GhlContact> {
        let url = self.endpoint(&["contacts", contact_id])?;
        let response = self.request(Method::GET, url).send().await?;

        match response.status() {
            status if status.is_success() => Ok(response.json::<ContactEnvelope>().await?.contact),
            StatusCode::NOT_FOUND => Err(PlanGateError::AccountNotFound),
            _ => Err(upstream_failure(response.status(), "get contact")),
        }
    }
}

#[async_trait]
impl ContactDirectory for GhlContactDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Contact>> {
        let email = normalize_email(email);
        let url = self.endpoint(&["contacts", ""])?;

        let response = self
            .request(Method::GET, url)
            .query(&[("query", email.as_str()), ("locationId", self.location_id.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_failure(response.status(), "search contacts"));
        }

        // The search endpoint is fuzzy; only an exact email match counts.
        let body: SearchResponse = response.json().await?;
        let contact = body
            .contacts
            .into_iter()
            .find(|c| c.email.as_deref().is_some_and(|e| normalize_email(e) == email))
            .map(GhlContact::into_contact);

        tracing::debug!(
            target: "plangate.contacts.ghl",
            found = contact.is_some(),
            "Contact lookup completed"
        );

        Ok(contact)
    }

    async fn create(&self, new: NewContact) -> Result<Contact> {
        let email = normalize_email(&new.email);
        let (first_name, last_name) = split_display_name(&new.display_name);
        let tag = self.catalog.tag_for_tier(new.tier).to_string();
        let url = self.endpoint(&["contacts", ""])?;

        let response = self
            .request(Method::POST, url)
            .json(&json!({
                "email": email,
                "firstName": first_name,
                "lastName": last_name,
                "name": new.display_name.trim(),
                "locationId": self.location_id,
                "tags": [tag],
                "source": "plangate",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if is_duplicate(status, &body) {
                return Err(PlanGateError::ContactAlreadyExists);
            }
            return Err(upstream_failure(status, "create contact"));
        }

        let mut contact = response.json::<ContactEnvelope>().await?.contact.into_contact();
        if contact.email.is_empty() {
            contact.email = email;
        }
        // Some API versions omit tags from the create response.
        if contact.tags.is_empty() {
            contact.tags.insert(tag);
        }

        tracing::info!(
            target: "plangate.contacts.ghl",
            contact_id = %contact.id,
            tier = %new.tier,
            "Contact created"
        );

        Ok(contact)
    }

    async fn set_plan_tags(&self, contact_id: &str, tags: &[String]) -> Result<()> {
        let url = self.endpoint(&["contacts", contact_id, "tags"])?;

        // Add before removing: a failure part-way leaves the contact on its
        // old tier or the new one, never on no plan tag at all.
        if !tags.is_empty() {
            let response = self
                .request(Method::POST, url.clone())
                .json(&json!({ "tags": tags }))
                .send()
                .await?;
            match response.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND => return Err(PlanGateError::AccountNotFound),
                _ => return Err(upstream_failure(response.status(), "add plan tags")),
            }
        }

        let stale = stale_plan_tags(&self.catalog, tags);
        if !stale.is_empty() {
            let response = self
                .request(Method::DELETE, url)
                .json(&json!({ "tags": stale }))
                .send()
                .await?;
            match response.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND => return Err(PlanGateError::AccountNotFound),
                _ => return Err(upstream_failure(response.status(), "remove plan tags")),
            }
        }

        tracing::info!(
            target: "plangate.contacts.ghl",
            contact_id = %contact_id,
            tags = ?tags,
            "Plan tags replaced"
        );

        Ok(())
    }
}

/// Plan tags (and aliases) to strip once `keep` has been added.
fn stale_plan_tags<'a>(catalog: &'a PlanCatalog, keep: &[String]) -> Vec<&'a str> {
    catalog
        .plan_tags()
        .into_iter()
        .filter(|tag| !keep.iter().any(|k| k.eq_ignore_ascii_case(tag)))
        .collect()
}

#[async_trait]
impl CredentialStore for GhlContactDirectory {
    async fn password_hash(&self, contact_id: &str) -> Result<Option<String>> {
        let contact = self.fetch_contact(contact_id).await?;
        Ok(custom_field_value(&contact.custom_fields, &self.password_field))
    }

    async fn store_password_hash(&self, contact_id: &str, hash: &str) -> Result<()> {
        let url = self.endpoint(&["contacts", contact_id])?;
        let response = self
            .request(Method::PUT, url)
            .json(&json!({
                "customFields": [{ "key": self.password_field, "field_value": hash }]
            }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(PlanGateError::AccountNotFound),
            _ => Err(upstream_failure(response.status(), "update contact")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    contacts: Vec<GhlContact>,
}

#[derive(Debug, Deserialize)]
struct ContactEnvelope {
    contact: GhlContact,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GhlContact {
    id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    contact_name: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    custom_fields: Value,
}

impl GhlContact {
    fn into_contact(self) -> Contact {
        let email = self.email.as_deref().map(normalize_email).unwrap_or_default();

        let full_name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        let display_name = [Some(full_name), self.name, self.contact_name]
            .into_iter()
            .flatten()
            .map(|n| n.trim().to_string())
            .find(|n| !n.is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());

        let tags: BTreeSet<String> = self
            .tags
            .unwrap_or_default()
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        Contact {
            id: self.id,
            email,
            display_name,
            tags,
        }
    }
}

/// Read a custom field value by key.
///
/// Accepts both the object form (`{"password_hash": "..."}`) and the list
/// form (`[{"key": "password_hash", "value": "..."}]`) the API returns.
pub(super) fn custom_field_value(fields: &Value, key: &str) -> Option<String> {
    let qualified = format!("contact.{}", key);
    let value = match fields {
        Value::Object(map) => map.get(key),
        Value::Array(items) => items
            .iter()
            .find(|item| {
                ["key", "fieldKey", "id"].iter().any(|k| {
                    item.get(k)
                        .and_then(Value::as_str)
                        .is_some_and(|v| v == key || v == qualified)
                })
            })
            .and_then(|item| item.get("value").or_else(|| item.get("field_value"))),
        _ => None,
    };

    value
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn is_duplicate(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || (matches!(status, StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY)
            && body.to_ascii_lowercase().contains("duplicat"))
}

fn upstream_failure(status: StatusCode, operation: &'static str) -> PlanGateError {
    tracing::warn!(
        target: "plangate.contacts.ghl",
        operation,
        status = status.as_u16(),
        "CRM request failed"
    );
    PlanGateError::upstream(format!("{} failed with HTTP {}", operation, status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plans::Tier;
    use wiremock::matchers::{body_json, body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn directory(server: &MockServer) -> GhlContactDirectory {
        GhlContactDirectory::new(
            &server.uri(),
            SecretString::from("test-key".to_string()),
            "loc-1",
            Arc::new(PlanCatalog::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_find_by_email_matches_exact_email() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .and(query_param("query", "ada@x.com"))
            .and(query_param("locationId", "loc-1"))
            .and(header("Authorization", "Bearer test-key"))
            .and(header("Version", API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contacts": [
                    { "id": "other", "email": "ada@x.com.au", "tags": [] },
                    {
                        "id": "c1",
                        "email": "Ada@X.com",
                        "firstName": "Ada",
                        "lastName": "Lovelace",
                        "tags": ["siteoptz-plan-pro", "lead"]
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let contact = directory(&server)
            .find_by_email(" ADA@x.com ")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(contact.id, "c1");
        assert_eq!(contact.email, "ada@x.com");
        assert_eq!(contact.display_name, "Ada Lovelace");
        assert!(contact.has_tag("siteoptz-plan-pro"));
        assert!(contact.has_tag("lead"));
    }

    #[tokio::test]
    async fn test_find_by_email_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "contacts": [] })))
            .mount(&server)
            .await;

        assert!(directory(&server).find_by_email("a@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_and_auth_errors_are_upstream_unavailable() {
        for status in [401, 403, 429, 500, 502] {
            let server = MockServer::start().await;
            Mock::given(method("GET"))
                .and(path("/contacts/"))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;

            let err = directory(&server).find_by_email("a@x.com").await.unwrap_err();
            assert!(
                matches!(err, PlanGateError::UpstreamUnavailable(_)),
                "status {} mapped to {:?}",
                status,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_timeout_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "contacts": [] }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let dir = directory(&server)
            .with_timeout(Duration::from_millis(100))
            .unwrap();
        let err = dir.find_by_email("a@x.com").await.unwrap_err();
        assert!(matches!(err, PlanGateError::UpstreamUnavailable(_)));
    }

    #[tokio::test]
    async fn test_malformed_body_is_upstream_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = directory(&server).find_by_email("a@x.com").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_create_sends_plan_tag() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .and(body_partial_json(json!({
                "email": "ada@x.com",
                "firstName": "Ada",
                "lastName": "Lovelace",
                "locationId": "loc-1",
                "tags": ["siteoptz-plan-starter"]
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "contact": {
                    "id": "new-1",
                    "email": "ada@x.com",
                    "firstName": "Ada",
                    "lastName": "Lovelace"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let contact = directory(&server)
            .create(NewContact {
                email: "Ada@X.com".to_string(),
                display_name: "Ada Lovelace".to_string(),
                tier: Tier::Starter,
            })
            .await
            .unwrap();

        assert_eq!(contact.id, "new-1");
        assert!(contact.has_tag("siteoptz-plan-starter"));
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": 400,
                "message": "This location does not allow duplicated contacts.",
                "meta": { "contactId": "c1" }
            })))
            .mount(&server)
            .await;

        let err = directory(&server)
            .create(NewContact {
                email: "a@x.com".to_string(),
                display_name: "A".to_string(),
                tier: Tier::Free,
            })
            .await
            .unwrap_err();
        assert_eq!(err, PlanGateError::ContactAlreadyExists);
    }

    #[tokio::test]
    async fn test_set_plan_tags_adds_then_removes_stale() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/c1/tags"))
            .and(body_json(json!({ "tags": ["siteoptz-plan-pro"] })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "tags": ["siteoptz-plan-pro"] })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/contacts/c1/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "tags": [] })))
            .expect(1)
            .mount(&server)
            .await;

        directory(&server)
            .set_plan_tags("c1", &["siteoptz-plan-pro".to_string()])
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, reqwest::Method::POST);
        assert_eq!(requests[1].method, reqwest::Method::DELETE);

        let removed: Value = serde_json::from_slice(&requests[1].body).unwrap();
        let removed: Vec<&str> = removed["tags"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        assert!(!removed.contains(&"siteoptz-plan-pro"));
        assert!(removed.contains(&"siteoptz-plan-starter"));
        assert!(removed.contains(&"tier-enterprise"));
    }

    #[tokio::test]
    async fn test_set_plan_tags_add_failure_keeps_old_plan() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/c1/tags"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/contacts/c1/tags"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = directory(&server)
            .set_plan_tags("c1", &["siteoptz-plan-enterprise".to_string()])
            .await
            .unwrap_err();

        assert!(matches!(err, PlanGateError::UpstreamUnavailable(_)));
        assert!(err.is_retryable());
        let requests = server.received_requests().await.unwrap();
        assert!(requests.iter().all(|r| r.method != reqwest::Method::DELETE));
    }

    #[test]
    fn test_stale_plan_tags_keeps_requested() {
        let catalog = PlanCatalog::default();
        let stale = stale_plan_tags(&catalog, &["SiteOptz-Plan-Pro".to_string()]);
        assert!(!stale.contains(&"siteoptz-plan-pro"));
        assert!(stale.contains(&"pro-plan"));
        assert_eq!(stale.len(), catalog.plan_tags().len() - 1);
    }

    #[tokio::test]
    async fn test_set_plan_tags_unknown_contact() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/contacts/gone/tags"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = directory(&server)
            .set_plan_tags("gone", &["siteoptz-plan-pro".to_string()])
            .await
            .unwrap_err();
        assert_eq!(err, PlanGateError::AccountNotFound);
    }

    #[tokio::test]
    async fn test_password_hash_from_custom_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/contacts/c1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "contact": {
                    "id": "c1",
                    "email": "a@x.com",
                    "customFields": [
                        { "id": "f0", "value": "unrelated" },
                        { "id": "f1", "key": "password_hash", "value": "$argon2id$stored" }
                    ]
                }
            })))
            .mount(&server)
            .await;

        let hash = directory(&server).password_hash("c1").await.unwrap();
        assert_eq!(hash.as_deref(), Some("$argon2id$stored"));
    }

    #[tokio::test]
    async fn test_store_password_hash() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/contacts/c1"))
            .and(body_json(json!({
                "customFields": [{ "key": "password_hash", "field_value": "$argon2id$new" }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "succeded": true })))
            .expect(1)
            .mount(&server)
            .await;

        directory(&server)
            .store_password_hash("c1", "$argon2id$new")
            .await
            .unwrap();
    }

    #[test]
    fn test_custom_field_object_form() {
        let fields = json!({ "password_hash": "h1", "other": "x" });
        assert_eq!(custom_field_value(&fields, "password_hash").as_deref(), Some("h1"));
        assert_eq!(custom_field_value(&json!({ "password_hash": "" }), "password_hash"), None);
        assert_eq!(custom_field_value(&Value::Null, "password_hash"), None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let contact: GhlContact = serde_json::from_value(json!({
            "id": "c1",
            "email": "grace@navy.mil",
            "contactName": "Grace Hopper",
            "tags": null
        }))
        .unwrap();
        let contact = contact.into_contact();
        assert_eq!(contact.display_name, "Grace Hopper");
        assert!(contact.tags.is_empty());

        let contact: GhlContact =
            serde_json::from_value(json!({ "id": "c2", "email": "linus@x.org" })).unwrap();
        assert_eq!(contact.into_contact().display_name, "linus");
    }

    #[test]
    fn test_invalid_base_url() {
        let err = GhlContactDirectory::new(
            "not a url",
            SecretString::from("k".to_string()),
            "loc",
            Arc::new(PlanCatalog::default()),
        )
        .unwrap_err();
        assert!(matches!(err, PlanGateError::BadRequest(_)));
    }
}
