// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Authentication and authorization failures produced by the gateway.
///
/// `UpstreamUnavailable` is kept apart from the credential failures so that
/// callers can tell a retryable outage from a real access denial.
#[derive(Debug)]
pub enum AuthError {
    /// No valid grant could be resolved
    Unauthenticated,
    /// Bearer token failed verification
    InvalidToken(String),
    /// Token has expired
    TokenExpired,
    /// Grant is valid but lacks the required role
    Forbidden,
    /// Identity provider unreachable or timed out
    UpstreamUnavailable(String),
    /// Login callback parameters did not match the pending login
    InvalidCallback(String),
    /// Internal error
    InternalError(String),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::InvalidToken(_) => "invalid_token",
            AuthError::TokenExpired => "token_expired",
            AuthError::Forbidden => "forbidden",
            AuthError::UpstreamUnavailable(_) => "upstream_unavailable",
            AuthError::InvalidCallback(_) => "invalid_callback",
            AuthError::InternalError(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated | AuthError::InvalidToken(_) | AuthError::TokenExpired => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::InvalidCallback(_) => StatusCode::BAD_REQUEST,
            AuthError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AuthError::UpstreamUnavailable(_))
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthenticated => write!(f, "Authentication is required"),
            AuthError::InvalidToken(msg) => write!(f, "Token is invalid: {msg}"),
            AuthError::TokenExpired => write!(f, "Token has expired"),
            AuthError::Forbidden => write!(f, "Insufficient permissions for this route"),
            // Detail is logged at the failure site, never returned.
            AuthError::UpstreamUnavailable(_) => {
                write!(f, "Identity provider is temporarily unavailable")
            }
            AuthError::InvalidCallback(msg) => write!(f, "Invalid login callback: {msg}"),
            AuthError::InternalError(_) => write!(f, "Internal authentication error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        let mut response = (status, body).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn unauthenticated_returns_401_with_challenge() {
        let response = AuthError::Unauthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[WWW_AUTHENTICATE], "Bearer");

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error_code"], "unauthenticated");
    }

    #[tokio::test]
    async fn forbidden_returns_403() {
        let response = AuthError::Forbidden.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(response.headers().get(WWW_AUTHENTICATE).is_none());
    }

    #[tokio::test]
    async fn upstream_unavailable_hides_detail() {
        let err = AuthError::UpstreamUnavailable("connect timeout to 10.0.0.5".to_string());
        assert!(err.is_retryable());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8(body_bytes.to_vec()).unwrap();
        assert!(!body.contains("10.0.0.5"));
        assert!(body.contains("upstream_unavailable"));
    }

    #[test]
    fn denials_are_not_retryable() {
        assert!(!AuthError::Forbidden.is_retryable());
        assert!(!AuthError::Unauthenticated.is_retryable());
    }
}
