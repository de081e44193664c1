// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Public pages and redirects into the realm's own self-service pages.

use axum::{extract::State, response::Response};

use crate::{auth::middleware::redirect, state::AppState};

pub const WELCOME_TEXT: &str = "Welcome! This page is public.";

/// Public landing page.
#[utoipa::path(
    get,
    path = "/",
    tag = "Public",
    responses(
        (status = 200, description = "Welcome text", body = String, content_type = "text/plain")
    )
)]
pub async fn home() -> &'static str {
    WELCOME_TEXT
}

/// Redirect to the realm's account console.
#[utoipa::path(
    get,
    path = "/account",
    tag = "Public",
    responses(
        (status = 302, description = "Redirect to the account console")
    )
)]
pub async fn account(State(state): State<AppState>) -> Response {
    redirect(&state.config.endpoints.account_console())
}

/// Redirect to the realm's credential-reset page for the login client.
#[utoipa::path(
    get,
    path = "/reset-password",
    tag = "Public",
    responses(
        (status = 302, description = "Redirect to the credential-reset page")
    )
)]
pub async fn reset_password(State(state): State<AppState>) -> Response {
    let config = &state.config;
    redirect(
        &config
            .endpoints
            .reset_credentials(&config.login_client.client_id),
    )
}
