// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{AuthGateway, SessionCookie};
use crate::config::GatewayConfig;
use crate::passthrough::AdminApiClient;
use crate::providers::IdentityProvider;
use crate::store::SessionStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub gateway: AuthGateway,
    pub admin_api: AdminApiClient,
}

impl AppState {
    pub fn new(
        config: GatewayConfig,
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionStore>,
        admin_api: AdminApiClient,
    ) -> Self {
        let cookie = SessionCookie::new(&config.session_secret, config.cookie_secure);
        let gateway = AuthGateway::new(
            provider,
            sessions,
            cookie,
            crate::api::route_policies(),
            config.callback_url(),
        );
        Self {
            config: Arc::new(config),
            gateway,
            admin_api,
        }
    }
}
