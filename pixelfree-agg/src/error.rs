//! Error types for pixelfree-agg
//!
//! Every failure leaving the service carries a stable machine-readable code
//! and a human-readable message. Status codes are chosen from the error
//! variant, never from message text.

use crate::services::{AuthError, DispatchError, ResolutionError, TargetError, UpstreamError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<TargetError>,
    },

    /// No valid access token (401)
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    /// Resource not found (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream kept answering 429 (429)
    #[error("Upstream rate limited: {0}")]
    RateLimited(String),

    /// Upstream failure (502)
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Internal server error (500); detail is logged, not returned
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Message returned in place of internal error detail
const INTERNAL_MESSAGE: &str = "Internal Server Error";

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: Vec::new(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_error",
            ApiError::AuthRequired(_) => "auth_required",
            ApiError::NotFound(_) => "not_found",
            ApiError::RateLimited(_) => "rate_limited",
            ApiError::Upstream(_) => "upstream_error",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Message safe to show outside the service; internal detail is withheld
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Validation { message, .. } => message.clone(),
            ApiError::AuthRequired(msg)
            | ApiError::NotFound(msg)
            | ApiError::RateLimited(msg)
            | ApiError::Upstream(msg) => msg.clone(),
            ApiError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenStore(detail) => ApiError::Internal(detail),
            other => ApiError::AuthRequired(other.to_string()),
        }
    }
}

impl From<UpstreamError> for ApiError {
    fn from(err: UpstreamError) -> Self {
        if let UpstreamError::InvalidUrl(detail) = err {
            return ApiError::Internal(detail);
        }
        match err.status() {
            Some(429) => ApiError::RateLimited(err.to_string()),
            Some(404) => ApiError::NotFound(err.to_string()),
            _ => ApiError::Upstream(err.to_string()),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation { message, failures } => ApiError::Validation {
                message,
                details: failures,
            },
            DispatchError::Auth(e) => e.into(),
            DispatchError::Upstream(e) => e.into(),
        }
    }
}

impl From<ResolutionError> for ApiError {
    fn from(err: ResolutionError) -> Self {
        match err {
            ResolutionError::MalformedHandle { .. } => ApiError::bad_request(err.to_string()),
            ResolutionError::Unresolved { .. } => ApiError::NotFound(err.to_string()),
            ResolutionError::Auth(e) => e.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Internal error");
        }

        let mut error = json!({
            "code": self.code(),
            "message": self.public_message(),
        });
        if let ApiError::Validation { details, .. } = &self {
            if !details.is_empty() {
                error["details"] = json!(details);
            }
        }

        (self.status_code(), Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_status_mapping() {
        let err = |status| UpstreamError::Status {
            status,
            path: "/api/v1/timelines/tag/x".to_string(),
            body: None,
        };
        assert!(matches!(ApiError::from(err(429)), ApiError::RateLimited(_)));
        assert!(matches!(ApiError::from(err(404)), ApiError::NotFound(_)));
        assert!(matches!(ApiError::from(err(500)), ApiError::Upstream(_)));
        assert!(matches!(
            ApiError::from(UpstreamError::Network("refused".to_string())),
            ApiError::Upstream(_)
        ));
    }

    #[test]
    fn test_auth_mapping() {
        assert!(matches!(
            ApiError::from(AuthError::NotAuthenticated),
            ApiError::AuthRequired(_)
        ));
        assert!(matches!(
            ApiError::from(AuthError::TokenStore("disk".to_string())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_internal_error_hides_detail() {
        let err = ApiError::Internal("Parse /home/me/token.json failed".to_string());
        assert_eq!(err.code(), "internal_error");
        assert_eq!(err.public_message(), "Internal Server Error");

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_invalid_url_is_internal() {
        assert!(matches!(
            ApiError::from(UpstreamError::InvalidUrl("bad".to_string())),
            ApiError::Internal(_)
        ));
    }
}
