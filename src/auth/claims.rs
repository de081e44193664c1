// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token claims and the authentication grant built from them.

use serde::{Deserialize, Serialize};

/// Claims carried by a Keycloak access token.
///
/// Only the fields the gateway reads are declared; everything else in the
/// token is ignored by serde.
#[derive(Debug, Clone, Deserialize)]
pub struct KeycloakClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Expiration timestamp
    pub exp: i64,

    /// Issued at timestamp
    #[serde(default)]
    pub iat: i64,

    /// Issuer (the realm URL)
    #[serde(default)]
    pub iss: String,

    /// Keycloak session ID
    #[serde(default)]
    pub sid: Option<String>,

    /// Login name shown to the user
    #[serde(default)]
    pub preferred_username: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Realm-level role assignments
    #[serde(default)]
    pub realm_access: Option<RealmAccess>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Tokens returned by the identity provider's token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the refresh token in seconds
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("expires_in", &self.expires_in)
            .field("refresh_expires_in", &self.refresh_expires_in)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("has_id_token", &self.id_token.is_some())
            .finish()
    }
}

/// Resolved proof of identity for a request.
///
/// A grant is stored in the session between requests and handed to handlers
/// through [`RequestIdentity`](super::RequestIdentity). Handlers only ever see
/// unexpired grants.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationGrant {
    /// Canonical user ID (`sub` claim)
    pub subject: String,
    /// Display name (`preferred_username` claim)
    pub username: Option<String>,
    pub email: Option<String>,
    /// Realm roles in the order the token lists them
    pub roles: Vec<String>,
    /// Access token expiry (Unix timestamp)
    pub expires_at: i64,
    /// Keycloak session ID, if the token carried one
    pub session_state: Option<String>,

    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Refresh token expiry (Unix timestamp)
    pub refresh_expires_at: Option<i64>,
    pub id_token: Option<String>,
}

impl std::fmt::Debug for AuthenticationGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationGrant")
            .field("subject", &self.subject)
            .field("username", &self.username)
            .field("roles", &self.roles)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

impl AuthenticationGrant {
    /// Build a grant from verified access-token claims.
    ///
    /// `tokens` is `None` for bearer requests, where the caller only ever
    /// presented the access token itself.
    pub fn from_claims(
        claims: KeycloakClaims,
        access_token: String,
        tokens: Option<&TokenSet>,
        now: i64,
    ) -> Self {
        let roles = claims.realm_access.map(|ra| ra.roles).unwrap_or_default();

        Self {
            subject: claims.sub,
            username: claims.preferred_username,
            email: claims.email,
            roles,
            expires_at: claims.exp,
            session_state: claims.sid,
            access_token,
            refresh_token: tokens.and_then(|t| t.refresh_token.clone()),
            refresh_expires_at: tokens
                .and_then(|t| t.refresh_expires_in)
                .filter(|secs| *secs > 0)
                .map(|secs| now + secs),
            id_token: tokens.and_then(|t| t.id_token.clone()),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Whether the refresh token can still be redeemed.
    pub fn can_refresh(&self, now: i64) -> bool {
        self.refresh_token.is_some() && self.refresh_expires_at.is_none_or(|exp| exp > now)
    }
}
