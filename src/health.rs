use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppContext;
use crate::contacts::ContactDirectory;
use crate::error::PlanGateError;

/// Health check status
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> ComponentHealth;
}

/// Always healthy while the process serves requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHealthCheck;

#[async_trait]
impl HealthCheck for BasicHealthCheck {
    fn name(&self) -> &str {
        "application"
    }

    async fn check(&self) -> ComponentHealth {
        ComponentHealth {
            name: self.name().to_string(),
            status: HealthStatus::Healthy,
            message: Some("Application is running".to_string()),
        }
    }
}

/// Probes the contact directory with a lookup that never matches.
///
/// An unreachable directory is `Degraded`, not `Unhealthy`: token
/// verification and gate checks keep working without it.
pub struct ContactDirectoryHealthCheck {
    directory: Arc<dyn ContactDirectory>,
}

impl ContactDirectoryHealthCheck {
    pub fn new(directory: Arc<dyn ContactDirectory>) -> Self {
        Self { directory }
    }
}

const PROBE_EMAIL: &str = "health-probe@plangate.invalid";

#[async_trait]
impl HealthCheck for ContactDirectoryHealthCheck {
    fn name(&self) -> &str {
        "contacts"
    }

    async fn check(&self) -> ComponentHealth {
        let (status, message) = match self.directory.find_by_email(PROBE_EMAIL).await {
            Ok(_) => (HealthStatus::Healthy, None),
            Err(e @ PlanGateError::UpstreamUnavailable(_)) => {
                tracing::warn!(target: "plangate.health", error = %e, "Contact directory unreachable");
                (HealthStatus::Degraded, Some("Contact directory unreachable".to_string()))
            }
            Err(e) => {
                tracing::error!(target: "plangate.health", error = %e, "Contact directory probe failed");
                (HealthStatus::Unhealthy, Some("Contact directory probe failed".to_string()))
            }
        };

        ComponentHealth {
            name: self.name().to_string(),
            status,
            message,
        }
    }
}

/// Health check manager that runs all registered checks
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: vec![Arc::new(BasicHealthCheck)],
        }
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::with_capacity(self.checks.len());
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

/// Handler for the health endpoint
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    ctx.health.check_health().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contacts::InMemoryContactDirectory;

    #[tokio::test]
    async fn test_basic_is_healthy() {
        let response = HealthChecker::new().check_health().await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_directory_degrades() {
        let directory = InMemoryContactDirectory::default();
        let checker = HealthChecker::new()
            .with_check(Arc::new(ContactDirectoryHealthCheck::new(Arc::new(directory.clone()))));

        assert_eq!(checker.check_health().await.status, HealthStatus::Healthy);

        directory.set_offline(true);
        let response = checker.check_health().await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.checks[1].name, "contacts");
        assert_eq!(response.into_response().status(), StatusCode::OK);
    }

    #[test]
    fn test_unhealthy_is_503() {
        let response = HealthResponse {
            status: HealthStatus::Unhealthy,
            checks: vec![],
        };
        assert_eq!(response.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
