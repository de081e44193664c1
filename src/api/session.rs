// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login callback and logout.

use axum::{
    extract::{Query, State},
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{info, warn};
use utoipa::IntoParams;

use crate::{
    auth::{
        middleware::{redirect, redirect_with_cookie},
        AuthError,
    },
    state::AppState,
};

/// Query parameters the identity provider appends to the redirect URI.
#[derive(Debug, Deserialize, IntoParams)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// Value issued with the login challenge
    pub state: Option<String>,
    /// Error code when the provider aborted the login
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Complete the authorization-code flow.
///
/// Redirects back to the page that triggered the login.
#[utoipa::path(
    get,
    path = "/auth/callback",
    tag = "Session",
    params(CallbackParams),
    responses(
        (status = 302, description = "Login complete, redirect to the original page"),
        (status = 400, description = "Callback does not match a pending login"),
        (status = 503, description = "Identity provider unavailable"),
    )
)]
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Response {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        info!(%error, %description, "Identity provider aborted login");
        return AuthError::InvalidCallback(error).into_response();
    }

    let (Some(code), Some(login_state)) = (params.code, params.state) else {
        return AuthError::InvalidCallback("missing code or state".to_string()).into_response();
    };

    match state
        .gateway
        .complete_login(&headers, &code, &login_state)
        .await
    {
        Ok(done) => redirect_with_cookie(local_path(&done.return_to), done.set_cookie),
        Err(e) => {
            warn!(error = %e, code = e.error_code(), "Login callback failed");
            e.into_response()
        }
    }
}

/// Destroy the session and sign out at the identity provider.
#[utoipa::path(
    get,
    path = "/logout",
    tag = "Session",
    responses(
        (status = 302, description = "Redirect to the identity provider's logout endpoint"),
    )
)]
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let home = format!("{}/", state.config.public_base_url);
    match state.gateway.logout(&headers, &home).await {
        Ok(url) => {
            let mut response = redirect(&url);
            response
                .headers_mut()
                .insert(SET_COOKIE, state.gateway.clear_cookie());
            response
        }
        Err(e) => e.into_response(),
    }
}

/// Only same-origin absolute paths are accepted as post-login targets.
fn local_path(target: &str) -> &str {
    if target.starts_with('/') && !target.starts_with("//") && !target.starts_with("/\\") {
        target
    } else {
        "/"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_rejects_other_origins() {
        assert_eq!(local_path("/dashboard?tab=1"), "/dashboard?tab=1");
        assert_eq!(local_path("//evil.example/"), "/");
        assert_eq!(local_path("https://evil.example/"), "/");
        assert_eq!(local_path("/\\evil.example"), "/");
    }
}
