// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Dashboard endpoint.

use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, AuthenticationGrant};

/// Response for GET /dashboard
#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardResponse {
    /// Login name from the `preferred_username` claim
    pub username: Option<String>,
    pub email: Option<String>,
    /// Realm roles, as listed in the token
    pub roles: Vec<String>,
}

impl From<&AuthenticationGrant> for DashboardResponse {
    fn from(grant: &AuthenticationGrant) -> Self {
        Self {
            username: grant.username.clone(),
            email: grant.email.clone(),
            roles: grant.roles.clone(),
        }
    }
}

/// Get the signed-in user's profile.
///
/// Values are read from the current grant; nothing is cached.
#[utoipa::path(
    get,
    path = "/dashboard",
    tag = "Dashboard",
    security(("bearer" = []), ("session" = [])),
    responses(
        (status = 200, description = "User profile", body = DashboardResponse),
        (status = 302, description = "Browser without a session, redirected to login"),
        (status = 401, description = "Unauthorized - invalid or missing token"),
        (status = 503, description = "Identity provider unavailable"),
    )
)]
pub async fn dashboard(Auth(grant): Auth) -> Json<DashboardResponse> {
    Json(grant.as_ref().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::tests::sample_grant;

    #[test]
    fn dashboard_response_from_grant() {
        let grant = sample_grant(&["offline_access", "admin"]);
        let response = DashboardResponse::from(&grant);
        assert_eq!(response.username.as_deref(), Some("alice"));
        assert_eq!(response.email.as_deref(), Some("alice@example.com"));
        assert_eq!(response.roles, vec!["offline_access", "admin"]);
    }
}
