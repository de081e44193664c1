// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client for the realm admin REST API.

use axum::body::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use super::credential_cache::ServiceCredentialCache;
use crate::config::RealmEndpoints;
use crate::providers::IdpError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdminApiError {
    /// Token endpoint or admin API unreachable / timed out
    #[error("admin API unavailable: {0}")]
    Unavailable(String),

    /// The service credential could not be obtained
    #[error("service credential exchange failed: {0}")]
    Credential(String),

    /// The admin API answered with a non-2xx status
    #[error("admin API returned HTTP {0}")]
    Upstream(u16),
}

impl From<IdpError> for AdminApiError {
    fn from(e: IdpError) -> Self {
        match e {
            IdpError::Unavailable(msg) => AdminApiError::Unavailable(msg),
            other => AdminApiError::Credential(other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct AdminApiClient {
    users_url: String,
    credentials: ServiceCredentialCache,
    http: Client,
}

impl AdminApiClient {
    pub fn new(endpoints: &RealmEndpoints, credentials: ServiceCredentialCache, http: Client) -> Self {
        Self {
            users_url: endpoints.admin_users(),
            credentials,
            http,
        }
    }

    pub fn credentials(&self) -> &ServiceCredentialCache {
        &self.credentials
    }

    /// `GET /admin/realms/{realm}/users`, body returned untouched.
    pub async fn list_users(&self) -> Result<Bytes, AdminApiError> {
        let credential = self.credentials.get().await?;

        let response = self
            .http
            .get(&self.users_url)
            .bearer_auth(credential.token())
            .send()
            .await
            .map_err(|e| AdminApiError::Unavailable(format!("GET users failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                // Revoked or rotated upstream; next call re-exchanges.
                self.credentials.invalidate();
            }
            warn!(status = status.as_u16(), "Admin API call failed");
            return Err(AdminApiError::Upstream(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AdminApiError::Unavailable(format!("reading users body failed: {}", e.without_url())))?;
        debug!(bytes = body.len(), "Relaying admin user listing");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::get,
        Router,
    };

    use crate::passthrough::credential_cache::tests::CountingSource;
    use crate::passthrough::CredentialSource;
    use crate::providers::KeycloakClient;

    const USERS: &str = r#"[{"id":"1","username":"alice"},{"id":"2","username":"bob"}]"#;

    async fn spawn_admin_api(status: AxumStatus, hits: Arc<AtomicUsize>) -> String {
        let app = Router::new().route(
            "/admin/realms/test/users",
            get(move |headers: HeaderMap| {
                let hits = hits.clone();
                async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    let authorized = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v.starts_with("Bearer svc-token-"));
                    if !authorized {
                        return AxumStatus::UNAUTHORIZED.into_response();
                    }
                    if status.is_success() {
                        (status, [("content-type", "application/json")], USERS).into_response()
                    } else {
                        (status, "upstream detail with secrets").into_response()
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base: &str, source: &Arc<CountingSource>) -> AdminApiClient {
        let cache = ServiceCredentialCache::new(source.clone() as Arc<dyn CredentialSource>);
        AdminApiClient::new(&RealmEndpoints::new(base, "test"), cache, Client::new())
    }

    #[tokio::test]
    async fn relays_body_unchanged() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_admin_api(AxumStatus::OK, hits.clone()).await;
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));

        let body = client(&base, &source).list_users().await.unwrap();
        assert_eq!(body.as_ref(), USERS.as_bytes());
    }

    #[tokio::test]
    async fn repeated_calls_reuse_credential() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_admin_api(AxumStatus::OK, hits.clone()).await;
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let client = client(&base, &source);

        for _ in 0..3 {
            client.list_users().await.unwrap();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn upstream_503_is_upstream_error_without_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_admin_api(AxumStatus::SERVICE_UNAVAILABLE, hits).await;
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));

        let err = client(&base, &source).list_users().await.unwrap_err();
        assert_eq!(err, AdminApiError::Upstream(503));
        assert!(!err.to_string().contains("secrets"));
    }

    #[tokio::test]
    async fn credential_failure_skips_admin_call() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_admin_api(AxumStatus::OK, hits.clone()).await;
        let source = Arc::new(CountingSource::failing(IdpError::Rejected(
            "unauthorized_client".to_string(),
        )));

        let err = client(&base, &source).list_users().await.unwrap_err();
        assert!(matches!(err, AdminApiError::Credential(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unreachable_admin_api_is_unavailable() {
        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let err = client("http://127.0.0.1:9", &source)
            .list_users()
            .await
            .unwrap_err();
        assert!(matches!(err, AdminApiError::Unavailable(_)));
    }

    #[tokio::test]
    async fn hanging_admin_api_times_out_as_unavailable() {
        let app = Router::new().route(
            "/admin/realms/test/users",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                USERS
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let source = Arc::new(CountingSource::ok(Duration::from_secs(300)));
        let cache = ServiceCredentialCache::new(source as Arc<dyn CredentialSource>);
        let http = KeycloakClient::http_client(Duration::from_millis(200)).unwrap();
        let client = AdminApiClient::new(
            &RealmEndpoints::new(format!("http://{addr}"), "test"),
            cache,
            http,
        );

        let started = std::time::Instant::now();
        let err = client.list_users().await.unwrap_err();
        assert!(matches!(err, AdminApiError::Unavailable(_)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn idp_outage_maps_to_unavailable() {
        let err: AdminApiError = IdpError::Unavailable("timeout".to_string()).into();
        assert!(matches!(err, AdminApiError::Unavailable(_)));
        let err: AdminApiError = IdpError::Rejected("nope".to_string()).into();
        assert!(matches!(err, AdminApiError::Credential(_)));
    }
}
