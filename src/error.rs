use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::plans::Tier;

/// The error taxonomy shared by every plangate component.
///
/// Each variant is a distinct, specific outcome. In particular an unreachable
/// CRM (`UpstreamUnavailable`) is never folded into "no account" or into the
/// free tier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanGateError {
    #[error("No account found for this email")]
    AccountNotFound,

    #[error("An account with this email already exists")]
    AccountAlreadyExists,

    /// Raised by a contact directory when asked to create a duplicate.
    #[error("Contact already exists in the directory")]
    ContactAlreadyExists,

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Session or token expired")]
    Expired,

    #[error("Signature mismatch")]
    SignatureMismatch,

    #[error("Token was issued for a different audience")]
    AudienceMismatch,

    #[error("Plan '{current}' does not include '{required}' access")]
    InsufficientPlan { current: Tier, required: Tier },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlanGateError {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::UpstreamUnavailable(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether the caller may retry the same operation unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }

    /// Stable machine-readable code used in API responses.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::AccountNotFound => "account_not_found",
            Self::AccountAlreadyExists => "account_already_exists",
            Self::ContactAlreadyExists => "contact_already_exists",
            Self::InvalidCredential => "invalid_credential",
            Self::UpstreamUnavailable(_) => "upstream_unavailable",
            Self::NotAuthenticated => "not_authenticated",
            Self::Expired => "expired",
            Self::SignatureMismatch => "signature_mismatch",
            Self::AudienceMismatch => "audience_mismatch",
            Self::InsufficientPlan { .. } => "insufficient_plan",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AccountNotFound => StatusCode::NOT_FOUND,
            Self::AccountAlreadyExists | Self::ContactAlreadyExists => StatusCode::CONFLICT,
            Self::InvalidCredential
            | Self::NotAuthenticated
            | Self::Expired
            | Self::SignatureMismatch
            | Self::AudienceMismatch => StatusCode::UNAUTHORIZED,
            Self::InsufficientPlan { .. } => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for clients.
    ///
    /// Server-side failures keep their details out of the response body; the
    /// full error is logged instead.
    fn safe_message(&self) -> String {
        match self {
            Self::UpstreamUnavailable(_) => {
                "The account service is temporarily unavailable. Please try again.".to_string()
            }
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

/// JSON body returned for failed API requests.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    error: &'static str,
    message: String,
    error_id: String,
    retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_tier: Option<Tier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required_tier: Option<Tier>,
}

impl IntoResponse for PlanGateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        let (current_tier, required_tier) = match &self {
            Self::InsufficientPlan { current, required } => (Some(*current), Some(*required)),
            _ => (None, None),
        };

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                code = self.code(),
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: self.code(),
            message: self.safe_message(),
            error_id,
            retryable: self.is_retryable(),
            current_tier,
            required_tier,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, PlanGateError>;

impl From<serde_json::Error> for PlanGateError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            PlanGateError::BadRequest(format!("JSON error: {}", err))
        } else {
            PlanGateError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<reqwest::Error> for PlanGateError {
    fn from(err: reqwest::Error) -> Self {
        // Every transport-level failure of the CRM is retryable from the
        // caller's point of view, including timeouts.
        if err.is_timeout() {
            PlanGateError::UpstreamUnavailable("Upstream request timed out".to_string())
        } else if err.is_connect() {
            PlanGateError::UpstreamUnavailable(format!("Connection error: {}", err))
        } else if let Some(status) = err.status() {
            PlanGateError::UpstreamUnavailable(format!("Upstream returned {}", status))
        } else if err.is_decode() {
            PlanGateError::UpstreamUnavailable(format!("Malformed upstream response: {}", err))
        } else {
            PlanGateError::UpstreamUnavailable(format!("Request error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_status_codes() {
        assert_eq!(PlanGateError::AccountNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(PlanGateError::AccountAlreadyExists.status_code(), StatusCode::CONFLICT);
        assert_eq!(PlanGateError::InvalidCredential.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            PlanGateError::upstream("down").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PlanGateError::InsufficientPlan {
                current: Tier::Starter,
                required: Tier::Pro
            }
            .status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_only_upstream_is_retryable() {
        assert!(PlanGateError::upstream("timeout").is_retryable());
        assert!(!PlanGateError::AccountNotFound.is_retryable());
        assert!(!PlanGateError::InvalidCredential.is_retryable());
        assert!(!PlanGateError::Expired.is_retryable());
    }

    #[test]
    fn test_safe_message_hides_internal_details() {
        let err = PlanGateError::internal("db password is hunter2");
        assert_eq!(err.safe_message(), "Internal server error");

        let err = PlanGateError::upstream("401 from https://crm.example/contacts");
        assert!(!err.safe_message().contains("crm.example"));
    }

    #[tokio::test]
    async fn test_insufficient_plan_response_body() {
        let response = PlanGateError::InsufficientPlan {
            current: Tier::Starter,
            required: Tier::Pro,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "insufficient_plan");
        assert_eq!(body["current_tier"], "starter");
        assert_eq!(body["required_tier"], "pro");
        assert_eq!(body["retryable"], false);
        assert!(body["error_id"].is_string());
    }

    #[test]
    fn test_json_syntax_error_is_bad_request() {
        let err: PlanGateError = serde_json::from_str::<serde_json::Value>("{not json")
            .unwrap_err()
            .into();
        assert!(matches!(err, PlanGateError::BadRequest(_)));
    }
}
