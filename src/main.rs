// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use realm_gateway::{
    api::router,
    config::{GatewayConfig, LogFormat},
    passthrough::{AdminApiClient, CredentialSource, ServiceCredentialCache},
    providers::{IdentityProvider, KeycloakClient, KeycloakCredentialSource},
    session_sweeper::SessionSweeper,
    state::AppState,
    store::{MemorySessionStore, SessionStore},
};

const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[tokio::main]
async fn main() {
    // Refuse to start on incomplete configuration, before anything binds.
    let config = match GatewayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_logging(config.log_format);

    let addr = match config.bind_addr() {
        Ok(addr) => addr,
        Err(e) => {
            error!(error = %e, "Invalid bind address");
            std::process::exit(1);
        }
    };

    let http = KeycloakClient::http_client(config.upstream_timeout)
        .expect("Failed to build HTTP client");

    let provider: Arc<dyn IdentityProvider> = Arc::new(KeycloakClient::new(&config, http.clone()));
    let credential_source: Arc<dyn CredentialSource> = Arc::new(KeycloakCredentialSource::new(
        &config.endpoints,
        config.admin_client.clone(),
        http.clone(),
    ));
    let admin_api = AdminApiClient::new(
        &config.endpoints,
        ServiceCredentialCache::new(credential_source),
        http,
    );
    let sessions: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new(config.session_ttl));

    let shutdown = CancellationToken::new();
    let sweeper = tokio::spawn(SessionSweeper::new(sessions.clone()).run(shutdown.clone()));

    info!(
        realm = config.endpoints.realm(),
        public_base_url = %config.public_base_url,
        "Configuration loaded"
    );

    let state = AppState::new(config, provider, sessions, admin_api);
    let app = router(state);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    info!(%addr, "Realm gateway listening (docs at /docs)");

    let server_shutdown = shutdown.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_shutdown.cancel();
        })
        .await;

    shutdown.cancel();
    let _ = sweeper.await;

    if let Err(e) = served {
        error!(error = %e, "Server failed");
        std::process::exit(1);
    }
    info!("Shutdown complete");
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = fmt().with_env_filter(filter).with_target(false);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.compact().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Graceful shutdown initiated");
}
