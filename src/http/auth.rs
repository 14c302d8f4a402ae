//! `/api/auth` endpoints: login, register, token verification, refresh and
//! plan changes.

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde::{Deserialize, Serialize};

use super::extract::SessionAuth;
use super::routes::RouteModule;
use crate::app::AppContext;
use crate::auth::ResolvedContact;
use crate::error::Result;
use crate::plans::Tier;
use crate::session::Session;
use crate::sso::{SESSION_AUDIENCE, SsoPayload, SsoToken};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    /// Requested plan; `free` when omitted.
    #[serde(default)]
    pub plan: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
    pub signature: String,
    /// Audience to check against; the session audience when omitted.
    #[serde(default)]
    pub audience: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub plan: String,
}

/// A session plus the bearer token that carries it.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session: Session,
    pub token: String,
    pub redirect_to: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub session: Session,
    pub audience: String,
}

pub struct AuthRoutes;

impl RouteModule for AuthRoutes {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route("/login", post(login))
            .route("/register", post(register))
            .route("/verify", post(verify))
            .route("/refresh", post(refresh))
            .route("/update-plan", post(update_plan))
    }

    fn prefix(&self) -> Option<&str> {
        Some("/api/auth")
    }
}

fn start_session(ctx: &AppContext, resolved: &ResolvedContact) -> Result<Session> {
    Session::start(&resolved.contact, resolved.tier, ctx.clock.now(), ctx.session_ttl)
}

fn respond(ctx: &AppContext, session: Session) -> Result<Json<SessionResponse>> {
    ctx.remember_tier(&session.contact_id, session.tier);
    let token = ctx.session_token(&session)?;
    let redirect_to = format!("/dashboard/{}", session.tier);
    Ok(Json(SessionResponse {
        session,
        token: token.to_bearer(),
        redirect_to,
    }))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<SessionResponse>> {
    let resolved = ctx.authenticator.authenticate(&req.email, &req.password).await?;
    let session = start_session(&ctx, &resolved)?;

    tracing::info!(
        target: "plangate.http.auth",
        contact_id = %session.contact_id,
        tier = %session.tier,
        "Login"
    );
    respond(&ctx, session)
}

async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    let tier = match req.plan.as_deref() {
        Some(plan) => plan.parse::<Tier>()?,
        None => Tier::Free,
    };

    let resolved = ctx
        .authenticator
        .register(&req.email, &req.name, &req.password, tier)
        .await?;
    let session = start_session(&ctx, &resolved)?;

    Ok((StatusCode::CREATED, respond(&ctx, session)?))
}

async fn verify(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<VerifyResponse>> {
    let audience = req.audience.as_deref().unwrap_or(SESSION_AUDIENCE);
    let token = SsoToken {
        token: req.token,
        signature: req.signature,
    };

    let payload: SsoPayload = ctx.codec.verify(&token, audience)?;
    let audience = payload.audience.clone();
    let mut session = payload.into_session();
    ctx.plan_changes.apply(&mut session);

    Ok(Json(VerifyResponse {
        valid: true,
        session,
        audience,
    }))
}

/// Re-resolve the tier from the CRM and hand back a fresh token.
async fn refresh(
    State(ctx): State<AppContext>,
    SessionAuth(session): SessionAuth,
) -> Result<Json<SessionResponse>> {
    let resolved = ctx
        .authenticator
        .reresolve(&session.contact_id, &session.email)
        .await?;

    respond(&ctx, session.refreshed(&resolved.contact, resolved.tier))
}

async fn update_plan(
    State(ctx): State<AppContext>,
    SessionAuth(session): SessionAuth,
    Json(req): Json<UpdatePlanRequest>,
) -> Result<Json<SessionResponse>> {
    let tier: Tier = req.plan.parse()?;

    let resolved = ctx
        .authenticator
        .change_plan(&session.contact_id, &session.email, tier)
        .await?;

    respond(&ctx, session.refreshed(&resolved.contact, resolved.tier))
}
