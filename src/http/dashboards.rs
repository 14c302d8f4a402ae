use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::Deserialize;

use super::extract::SessionAuth;
use super::routes::RouteModule;
use crate::app::AppContext;
use crate::error::Result;
use crate::plans::{Dashboard, Tier};
use crate::sso::SignedUrl;

#[derive(Debug, Deserialize)]
pub struct LoginUrlQuery {
    #[serde(default)]
    pub dashboard: Option<String>,
}

pub struct DashboardRoutes;

impl RouteModule for DashboardRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/", get(list_dashboards))
            .route("/login-url", get(login_url))
            .route("/{id}/embed", get(embed_url))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/dashboards")
    }
}

/// Dashboards the caller's tier includes.
async fn list_dashboards(
    State(ctx): State<AppContext>,
    SessionAuth(session): SessionAuth,
) -> Result<Json<Vec<Dashboard>>> {
    ctx.gate.check(Some(&session), Tier::Free).into_result()?;

    Ok(Json(
        ctx.dashboards
            .available_for(session.tier)
            .into_iter()
            .cloned()
            .collect(),
    ))
}

async fn embed_url(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    SessionAuth(session): SessionAuth,
) -> Result<Json<SignedUrl>> {
    Ok(Json(ctx.embedder()?.embed_url(Some(&session), &id)?))
}

async fn login_url(
    State(ctx): State<AppContext>,
    Query(query): Query<LoginUrlQuery>,
    SessionAuth(session): SessionAuth,
) -> Result<Json<SignedUrl>> {
    Ok(Json(
        ctx.embedder()?
            .login_url(Some(&session), query.dashboard.as_deref())?,
    ))
}
