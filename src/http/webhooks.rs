//! `/webhooks/ghl` endpoints: plan changes pushed from the CRM.
//!
//! Every delivery must carry a valid `x-ghl-signature`. Accepted tier
//! changes are recorded in the [`PlanChangeLog`](crate::plans::PlanChangeLog),
//! so session tokens issued before a downgrade lose the revoked dashboards
//! on their next request.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::{Serialize, de::DeserializeOwned};

use super::routes::RouteModule;
use crate::app::AppContext;
use crate::contacts::{ContactUpdatedEvent, OpportunityWonEvent, SIGNATURE_HEADER};
use crate::error::{PlanGateError, Result};
use crate::plans::{PlanChange, PlanTransition, Tier};

#[derive(Debug, Serialize)]
pub struct PlanChangeResponse {
    pub contact_id: String,
    /// `None` when the delivery carried no plan information.
    pub transition: Option<PlanTransition>,
}

pub struct WebhookRoutes;

impl RouteModule for WebhookRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/contact-updated", post(contact_updated))
            .route("/opportunity-won", post(opportunity_won))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/webhooks/ghl")
    }
}

fn verified<T: DeserializeOwned>(ctx: &AppContext, headers: &HeaderMap, body: &Bytes) -> Result<T> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    ctx.webhook_verifier()?.verify(body, signature)?;

    serde_json::from_slice(body)
        .map_err(|e| PlanGateError::bad_request(format!("Invalid webhook payload: {}", e)))
}

fn announce(contact_id: &str, transition: &PlanTransition) {
    match transition.change {
        PlanChange::Upgrade => tracing::info!(
            target: "plangate.webhooks.plan_change",
            contact_id = %contact_id,
            previous = %transition.previous,
            current = %transition.current,
            granted = ?transition.granted_dashboards,
            "Plan upgraded"
        ),
        PlanChange::Downgrade => tracing::warn!(
            target: "plangate.webhooks.plan_change",
            contact_id = %contact_id,
            previous = %transition.previous,
            current = %transition.current,
            revoked = ?transition.revoked_dashboards,
            "Plan downgraded; dashboard access revoked"
        ),
        PlanChange::Unchanged => tracing::debug!(
            target: "plangate.webhooks.plan_change",
            contact_id = %contact_id,
            tier = %transition.current,
            "Plan unchanged"
        ),
    }
}

/// Resolve the pushed tag set and record the tier it implies.
///
/// Without `oldTags` the previous tier is the last one recorded for the
/// contact, or the new one when nothing is known.
async fn contact_updated(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PlanChangeResponse>> {
    let event: ContactUpdatedEvent = verified(&ctx, &headers, &body)?;
    let contact_id = event
        .contact()
        .ok_or_else(|| PlanGateError::bad_request("Webhook payload has no contact id"))?
        .to_string();

    let Some(tags) = &event.tags else {
        return Ok(Json(PlanChangeResponse {
            contact_id,
            transition: None,
        }));
    };

    let resolver = ctx.authenticator.resolver();
    let current = resolver.resolve(tags);
    let previous = match &event.old_tags {
        Some(old) => resolver.resolve(old),
        None => ctx
            .plan_changes
            .latest(&contact_id)
            .map_or(current, |(tier, _)| tier),
    };

    let transition = PlanTransition::between(previous, current, &ctx.dashboards);
    ctx.remember_tier(&contact_id, current);
    announce(&contact_id, &transition);

    Ok(Json(PlanChangeResponse {
        contact_id,
        transition: Some(transition),
    }))
}

/// Move the contact onto the tier the won opportunity sells.
///
/// A known higher tier is kept; a won deal never downgrades.
async fn opportunity_won(
    State(ctx): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PlanChangeResponse>> {
    let event: OpportunityWonEvent = verified(&ctx, &headers, &body)?;
    let contact_id = event.contact_id.trim().to_string();
    if contact_id.is_empty() {
        return Err(PlanGateError::bad_request("Webhook payload has no contact id"));
    }

    let Some(purchased) = event.purchased_tier() else {
        tracing::debug!(
            target: "plangate.webhooks.plan_change",
            contact_id = %contact_id,
            "Opportunity does not name a plan"
        );
        return Ok(Json(PlanChangeResponse {
            contact_id,
            transition: None,
        }));
    };

    let known = known_tier(&ctx, &contact_id, event.email.as_deref()).await?;
    let target = known.map_or(purchased, |tier| tier.max(purchased));
    if known != Some(target) {
        ctx.authenticator.set_tier(&contact_id, target).await?;
    }
    ctx.remember_tier(&contact_id, target);

    let transition = known.map(|previous| PlanTransition::between(previous, target, &ctx.dashboards));
    if let Some(transition) = &transition {
        announce(&contact_id, transition);
    }

    Ok(Json(PlanChangeResponse {
        contact_id,
        transition,
    }))
}

/// Current tier from the CRM when the delivery names an email, else the
/// last recorded one.
async fn known_tier(ctx: &AppContext, contact_id: &str, email: Option<&str>) -> Result<Option<Tier>> {
    if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
        if let Some(resolved) = ctx.authenticator.lookup(email).await? {
            if resolved.contact.id == contact_id {
                return Ok(Some(resolved.tier));
            }
        }
    }
    Ok(ctx.plan_changes.latest(contact_id).map(|(tier, _)| tier))
}
