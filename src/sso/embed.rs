//! Signed embed and login URLs for the white-label dashboard host.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use url::Url;

use super::codec::SsoTokenCodec;
use crate::error::{PlanGateError, Result};
use crate::gate::AccessGate;
use crate::plans::{Dashboard, DashboardCatalog, Tier};
use crate::session::Session;

/// Audience for a login link that is not tied to a single dashboard.
pub const ALL_DASHBOARDS_AUDIENCE: &str = "dashboards";

/// A signed URL and when its token stops working.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

/// Builds plan-checked, signed URLs into the dashboard host.
#[derive(Clone, Debug)]
pub struct DashboardEmbedder {
    codec: SsoTokenCodec,
    gate: AccessGate,
    dashboards: Arc<DashboardCatalog>,
    host: Url,
}

impl DashboardEmbedder {
    /// # Errors
    ///
    /// `BadRequest` if `host` is not an absolute URL.
    pub fn new(
        host: &str,
        codec: SsoTokenCodec,
        gate: AccessGate,
        dashboards: Arc<DashboardCatalog>,
    ) -> Result<Self> {
        let host = Url::parse(host)
            .map_err(|e| PlanGateError::bad_request(format!("Invalid dashboard host: {}", e)))?;
        if host.cannot_be_a_base() {
            return Err(PlanGateError::bad_request("Invalid dashboard host"));
        }
        Ok(Self {
            codec,
            gate,
            dashboards,
            host,
        })
    }

    #[must_use]
    pub fn dashboards(&self) -> &DashboardCatalog {
        &self.dashboards
    }

    /// `<host>/embed/<id>?token=..&signature=..&user=..&embed=true&hide_nav=true`
    ///
    /// The session must pass the gate for the dashboard's minimum tier, and
    /// the token is bound to this dashboard only.
    pub fn embed_url(&self, session: Option<&Session>, dashboard_id: &str) -> Result<SignedUrl> {
        let (session, dashboard) = self.authorize(session, dashboard_id)?;
        let (token, claims) = self.codec.issue_with_claims(session, &dashboard.id)?;

        let mut url = self.path(&["embed", &dashboard.id])?;
        url.query_pairs_mut()
            .extend_pairs(token.query_pairs())
            .append_pair("user", &external_user_id(session))
            .append_pair("embed", "true")
            .append_pair("hide_nav", "true");

        tracing::debug!(
            target: "plangate.sso.embed",
            dashboard = %dashboard.id,
            contact_id = %session.contact_id,
            "Embed URL issued"
        );

        Ok(SignedUrl {
            url: url.into(),
            expires_at: claims.expires_at,
        })
    }

    /// `<host>/sso/login?sso_token=..&signature=..&email=..&user_id=..&return_to=..&auto_login=true`
    ///
    /// With a dashboard id the link is gated and bound like an embed URL;
    /// without one it lands on the dashboard list and only needs a live
    /// session.
    pub fn login_url(
        &self,
        session: Option<&Session>,
        dashboard_id: Option<&str>,
    ) -> Result<SignedUrl> {
        let (session, audience, return_to) = match dashboard_id {
            Some(id) => {
                let (session, dashboard) = self.authorize(session, id)?;
                (session, dashboard.id.clone(), format!("/dashboards/{}", dashboard.id))
            }
            None => {
                let session = session.ok_or(PlanGateError::NotAuthenticated)?;
                self.gate.check(Some(session), Tier::Free).into_result()?;
                (session, ALL_DASHBOARDS_AUDIENCE.to_string(), "/dashboards".to_string())
            }
        };

        let (token, claims) = self.codec.issue_with_claims(session, &audience)?;

        let mut url = self.path(&["sso", "login"])?;
        url.query_pairs_mut()
            .append_pair("sso_token", &token.token)
            .append_pair("signature", &token.signature)
            .append_pair("email", &session.email)
            .append_pair("user_id", &external_user_id(session))
            .append_pair("return_to", &return_to)
            .append_pair("auto_login", "true");

        Ok(SignedUrl {
            url: url.into(),
            expires_at: claims.expires_at,
        })
    }

    fn authorize<'s>(
        &self,
        session: Option<&'s Session>,
        dashboard_id: &str,
    ) -> Result<(&'s Session, &Dashboard)> {
        let dashboard = self
            .dashboards
            .get(dashboard_id)
            .ok_or_else(|| PlanGateError::bad_request(format!("Unknown dashboard '{}'", dashboard_id)))?;

        self.gate.check(session, dashboard.min_tier).into_result()?;
        let session = session.ok_or(PlanGateError::NotAuthenticated)?;
        Ok((session, dashboard))
    }

    fn path(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.host.clone();
        url.path_segments_mut()
            .map_err(|()| PlanGateError::internal("Dashboard host cannot have a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

/// Identifier the dashboard host knows the user by.
fn external_user_id(session: &Session) -> String {
    format!("user_{}", session.contact_id)
}
