// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Admin-only endpoints.
//!
//! These endpoints require the realm `admin` role and provide:
//! - A confirmation page
//! - The realm's user listing, relayed from the admin REST API

use axum::{
    extract::State,
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{auth::AdminOnly, error::ApiError, passthrough::AdminApiError, state::AppState};

pub const ADMIN_TEXT: &str = "Hello Admin, you have access to this admin route!";

/// Admin confirmation page.
#[utoipa::path(
    get,
    path = "/admin",
    tag = "Admin",
    security(("bearer" = []), ("session" = [])),
    responses(
        (status = 200, description = "Confirmation text", body = String, content_type = "text/plain"),
        (status = 403, description = "Forbidden - admin role required"),
    )
)]
pub async fn admin_panel(AdminOnly(_grant): AdminOnly) -> &'static str {
    ADMIN_TEXT
}

/// List the realm's users.
///
/// The upstream call is made with the gateway's service credential. The body
/// is relayed unchanged on success.
#[utoipa::path(
    get,
    path = "/admin/users",
    tag = "Admin",
    security(("bearer" = []), ("session" = [])),
    responses(
        (status = 200, description = "Realm users as returned by the admin API", content_type = "application/json"),
        (status = 403, description = "Forbidden - admin role required"),
        (status = 500, description = "Credential exchange refused or admin API error", body = crate::error::ErrorBody),
        (status = 503, description = "Identity provider unreachable", body = crate::error::ErrorBody),
    )
)]
pub async fn list_users(
    State(state): State<AppState>,
    AdminOnly(grant): AdminOnly,
) -> Result<Response, ApiError> {
    let body = state.admin_api.list_users().await.map_err(|e| {
        match &e {
            AdminApiError::Unavailable(detail) | AdminApiError::Credential(detail) => {
                warn!(subject = %grant.subject, error = %detail, "User listing failed")
            }
            AdminApiError::Upstream(status) => {
                warn!(subject = %grant.subject, status, "User listing failed")
            }
        }
        ApiError::from(e)
    })?;

    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}
