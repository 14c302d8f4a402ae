//! HTTP API: route modules, session extractors and the router that ties
//! them to an [`AppContext`](crate::AppContext).

mod auth;
mod dashboards;
mod extract;
mod plans;
mod routes;
mod webhooks;

pub use auth::{
    AuthRoutes, LoginRequest, RegisterRequest, SessionResponse, UpdatePlanRequest, VerifyRequest,
    VerifyResponse,
};
pub use dashboards::DashboardRoutes;
pub use extract::{OptionalSession, SessionAuth};
pub use plans::{AccessResponse, PlanRoutes, PlanSummary};
pub use routes::RouteModule;
pub use webhooks::{PlanChangeResponse, WebhookRoutes};
