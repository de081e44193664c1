// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Keycloak-backed authentication and route authorization for the gateway.
//!
//! ## Auth Flow
//!
//! 1. Each route has a [`RouteAuthorizationPolicy`] in the [`PolicyTable`]
//! 2. The gateway middleware resolves the caller's identity:
//!    - `Authorization: Bearer <access token>` is verified against the realm JWKS
//!    - otherwise the signed session cookie selects a server-side session
//!      whose grant is refreshed when expired
//! 3. The policy decides:
//!    - browsers without a grant are redirected to the realm login page
//!    - bearer callers without a valid token get 401
//!    - a grant lacking the required role gets 403
//!    - an unreachable identity provider gets 503
//!
//! ## Security
//!
//! - Tokens are verified with zero clock-skew leeway
//! - Session cookies are HMAC-signed, `HttpOnly` and `SameSite=Lax`
//! - The session is replaced on login
//! - Token values never appear in `Debug` output or logs

pub mod claims;
pub mod cookie;
pub mod error;
pub mod extractor;
pub mod jwks;
pub mod middleware;
pub mod policy;

pub use claims::{AuthenticationGrant, KeycloakClaims, TokenSet};
pub use cookie::SessionCookie;
pub use error::AuthError;
pub use extractor::{AdminOnly, Auth};
pub use jwks::JwksManager;
pub use middleware::{enforce, AuthGateway, RequestIdentity};
pub use policy::{PolicyDecision, PolicyTable, RouteAuthorizationPolicy, ADMIN_ROLE};
