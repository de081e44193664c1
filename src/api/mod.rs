// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::Request, middleware, routing::get, Router};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::Level;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{enforce, PolicyTable, RouteAuthorizationPolicy, ADMIN_ROLE},
    error::ErrorBody,
    state::AppState,
};

pub mod admin;
pub mod dashboard;
pub mod health;
pub mod public;
pub mod session;

/// Authorization policy of every route the gateway serves.
pub fn route_policies() -> PolicyTable {
    use RouteAuthorizationPolicy::{Authenticated, Public};

    PolicyTable::new()
        .with("/", Public)
        .with("/dashboard", Authenticated)
        .with("/admin", RouteAuthorizationPolicy::has_role(ADMIN_ROLE))
        .with("/admin/users", RouteAuthorizationPolicy::has_role(ADMIN_ROLE))
        .with("/account", Public)
        .with("/reset-password", Public)
        .with("/logout", Public)
        .with("/auth/callback", Public)
        .with("/health", Public)
        .with("/health/live", Public)
}

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/", get(public::home))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/admin", get(admin::admin_panel))
        .route("/admin/users", get(admin::list_users))
        .route("/account", get(public::account))
        .route("/reset-password", get(public::reset_password))
        .route("/logout", get(session::logout))
        .route("/auth/callback", get(session::callback))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route_layer(middleware::from_fn_with_state(
            state.gateway.clone(),
            enforce,
        ))
        .with_state(state);

    // Query strings carry login codes, so spans record the path only.
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-");
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id
            )
        })
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .merge(routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(trace_layer)
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
}

#[derive(OpenApi)]
#[openapi(
    paths(
        public::home,
        public::account,
        public::reset_password,
        dashboard::dashboard,
        admin::admin_panel,
        admin::list_users,
        session::callback,
        session::logout,
        health::health,
        health::liveness
    ),
    components(
        schemas(
            dashboard::DashboardResponse,
            health::ReadyResponse,
            health::HealthChecks,
            health::HealthResponse,
            ErrorBody
        )
    ),
    tags(
        (name = "Public", description = "Public pages and self-service redirects"),
        (name = "Dashboard", description = "Signed-in user profile"),
        (name = "Admin", description = "Admin-only endpoints"),
        (name = "Session", description = "Login callback and logout"),
        (name = "Health", description = "Liveness and readiness probes")
    )
)]
struct ApiDoc;
