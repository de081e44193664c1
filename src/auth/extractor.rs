// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for the identity the gateway resolved.
//!
//! The gateway middleware has already enforced the route's policy, so these
//! extractors only read the [`RequestIdentity`] it attached:
//!
//! ```rust,ignore
//! async fn dashboard(Auth(grant): Auth) -> impl IntoResponse {
//!     // grant is Arc<AuthenticationGrant>
//! }
//! ```

use std::sync::Arc;

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{policy::ADMIN_ROLE, AuthError, AuthenticationGrant, RequestIdentity};

/// Requires an authenticated identity.
///
/// Rejects with 401 if the route was not protected by the gateway or the
/// caller is anonymous.
pub struct Auth(pub Arc<AuthenticationGrant>);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .and_then(|identity| identity.grant().cloned())
            .map(Auth)
            .ok_or(AuthError::Unauthenticated)
    }
}

/// Requires the realm `admin` role.
pub struct AdminOnly(pub Arc<AuthenticationGrant>);

impl<S> FromRequestParts<S> for AdminOnly
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(grant) = Auth::from_request_parts(parts, state).await?;
        if !grant.has_role(ADMIN_ROLE) {
            return Err(AuthError::Forbidden);
        }
        Ok(AdminOnly(grant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::tests::sample_grant;
    use axum::http::Request;

    fn parts_with(identity: Option<RequestIdentity>) -> Parts {
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();
        if let Some(identity) = identity {
            parts.extensions.insert(identity);
        }
        parts
    }

    #[tokio::test]
    async fn auth_requires_gateway_identity() {
        let mut parts = parts_with(None);
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));

        let mut parts = parts_with(Some(RequestIdentity::anonymous()));
        let result = Auth::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn auth_returns_resolved_grant() {
        let mut parts = parts_with(Some(RequestIdentity::authenticated(sample_grant(&[]))));
        let Auth(grant) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(grant.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn admin_only_checks_role() {
        let mut parts = parts_with(Some(RequestIdentity::authenticated(sample_grant(&["user"]))));
        let result = AdminOnly::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(AuthError::Forbidden)));

        let mut parts = parts_with(Some(RequestIdentity::authenticated(sample_grant(&["admin"]))));
        assert!(AdminOnly::from_request_parts(&mut parts, &()).await.is_ok());
    }
}
