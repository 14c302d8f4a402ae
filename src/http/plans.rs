use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use serde::Serialize;

use super::extract::OptionalSession;
use super::routes::RouteModule;
use crate::app::AppContext;
use crate::error::Result;
use crate::plans::Tier;

#[derive(Debug, Serialize)]
pub struct PlanSummary {
    pub tier: Tier,
    pub name: String,
    pub monthly_price_usd: Option<u32>,
    pub upgrade_to: Option<Tier>,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub allowed: bool,
    pub current: Tier,
    pub required: Tier,
}

pub struct PlanRoutes;

impl RouteModule for PlanRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list_plans))
            .route("/{tier}/access", get(check_access))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/plans")
    }
}

async fn list_plans(State(ctx): State<AppContext>) -> Json<Vec<PlanSummary>> {
    Json(
        ctx.catalog
            .iter()
            .map(|plan| PlanSummary {
                tier: plan.tier,
                name: plan.display_name.clone(),
                monthly_price_usd: plan.monthly_price_usd,
                upgrade_to: plan.upgrade_to,
            })
            .collect(),
    )
}

/// 200 when the session may use `tier`; otherwise the gate's denial, with
/// both tiers in the body for an upgrade prompt.
async fn check_access(
    State(ctx): State<AppContext>,
    Path(tier): Path<String>,
    OptionalSession(session): OptionalSession,
) -> Result<Json<AccessResponse>> {
    let required: Tier = tier.parse()?;
    ctx.gate.check(session.as_ref(), required).into_result()?;

    let current = session.map(|s| s.tier).unwrap_or_default();
    Ok(Json(AccessResponse {
        allowed: true,
        current,
        required,
    }))
}
