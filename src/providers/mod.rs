// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity provider integration.
//!
//! The gateway talks to the identity provider only through the
//! [`IdentityProvider`] trait. [`KeycloakClient`] is the production
//! implementation; tests substitute in-memory fakes.

use async_trait::async_trait;

use crate::auth::claims::{KeycloakClaims, TokenSet};

pub mod keycloak;

pub use keycloak::{KeycloakClient, KeycloakCredentialSource};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum IdpError {
    /// Network failure, timeout or 5xx from the provider
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    /// The provider refused the request (4xx, e.g. `invalid_grant`)
    #[error("identity provider rejected the request: {0}")]
    Rejected(String),

    #[error("identity provider response was invalid: {0}")]
    InvalidResponse(String),

    #[error("token is invalid: {0}")]
    InvalidToken(String),

    #[error("token has expired")]
    TokenExpired,
}

impl IdpError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, IdpError::Unavailable(_))
    }
}

/// Narrow interface over the OIDC provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// URL of the interactive login page for the authorization-code flow.
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String;

    /// URL of the provider's end-session endpoint.
    fn logout_url(&self, id_token_hint: Option<&str>, post_logout_redirect_uri: &str) -> String;

    /// Redeem an authorization code.
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, IdpError>;

    /// Redeem a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdpError>;

    /// Verify an access token and return its claims.
    async fn verify_access_token(&self, token: &str) -> Result<KeycloakClaims, IdpError>;

    /// Cheap reachability probe used by the readiness endpoint.
    async fn check_ready(&self) -> Result<(), IdpError>;
}
