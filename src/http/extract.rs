//! Session extractors.
//!
//! A session travels as `Authorization: Bearer <token>.<signature>`, where
//! the token is an SSO token issued for the `session` audience.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::future::Future;

use crate::app::AppContext;
use crate::error::{PlanGateError, Result};
use crate::session::Session;
use crate::sso::{SESSION_AUDIENCE, SsoToken};

/// Requires a valid, unexpired session token.
#[derive(Debug, Clone)]
pub struct SessionAuth(pub Session);

/// `None` when no `Authorization` header is sent.
///
/// A header that is present but invalid still rejects the request.
#[derive(Debug, Clone)]
pub struct OptionalSession(pub Option<Session>);

fn bearer(parts: &Parts) -> Result<Option<&str>> {
    let Some(value) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };

    let value = value
        .to_str()
        .map_err(|_| PlanGateError::bad_request("Authorization header is not valid text"))?;

    value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(Some)
        .ok_or(PlanGateError::NotAuthenticated)
}

fn session_from(ctx: &AppContext, raw: &str) -> Result<Session> {
    let token = SsoToken::from_bearer(raw)?;
    let mut session = ctx.codec.verify(&token, SESSION_AUDIENCE)?.into_session();

    // A plan change recorded after the token was issued overrides its tier.
    if ctx.plan_changes.apply(&mut session) {
        tracing::debug!(
            target: "plangate.http.session",
            contact_id = %session.contact_id,
            tier = %session.tier,
            "Session tier replaced by a newer plan change"
        );
    }
    Ok(session)
}

impl FromRequestParts<AppContext> for SessionAuth {
    type Rejection = PlanGateError;

    fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> impl Future<Output = Result<Self>> + Send {
        let result = bearer(parts)
            .and_then(|raw| raw.ok_or(PlanGateError::NotAuthenticated))
            .and_then(|raw| session_from(ctx, raw))
            .map(SessionAuth);
        std::future::ready(result)
    }
}

impl FromRequestParts<AppContext> for OptionalSession {
    type Rejection = PlanGateError;

    fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> impl Future<Output = Result<Self>> + Send {
        let result = bearer(parts).and_then(|raw| {
            raw.map(|raw| session_from(ctx, raw))
                .transpose()
                .map(OptionalSession)
        });
        std::future::ready(result)
    }
}
