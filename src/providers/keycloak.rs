// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keycloak realm client: code flow, refresh, token verification and the
//! client-credentials exchange used by the admin passthrough.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Validation};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, info};

use super::{IdentityProvider, IdpError};
use crate::auth::claims::{KeycloakClaims, TokenSet};
use crate::auth::jwks::JwksManager;
use crate::config::{ClientCredentials, GatewayConfig, RealmEndpoints};
use crate::passthrough::{CredentialSource, ServiceCredential};

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_SERVICE_TOKEN_LIFETIME: Duration = Duration::from_secs(60);

/// OAuth error body returned by the token endpoint.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Clone)]
pub struct KeycloakClient {
    endpoints: RealmEndpoints,
    login_client: ClientCredentials,
    jwks: JwksManager,
    http: Client,
}

impl KeycloakClient {
    pub fn new(config: &GatewayConfig, http: Client) -> Self {
        Self {
            jwks: JwksManager::new(config.endpoints.jwks_uri(), http.clone()),
            endpoints: config.endpoints.clone(),
            login_client: config.login_client.clone(),
            http,
        }
    }

    /// HTTP client shared by every identity-provider call.
    pub fn http_client(timeout: Duration) -> Result<Client, IdpError> {
        Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdpError::InvalidResponse(format!("failed to build HTTP client: {e}")))
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenSet, IdpError> {
        post_token_form(&self.http, &self.endpoints.token_endpoint(), form).await
    }
}

#[async_trait]
impl IdentityProvider for KeycloakClient {
    fn authorization_url(&self, state: &str, redirect_uri: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("client_id", self.login_client.client_id.as_str())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", "openid")
            .append_pair("state", state)
            .finish();
        format!("{}?{query}", self.endpoints.authorization_endpoint())
    }

    fn logout_url(&self, id_token_hint: Option<&str>, post_logout_redirect_uri: &str) -> String {
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query
            .append_pair("client_id", self.login_client.client_id.as_str())
            .append_pair("post_logout_redirect_uri", post_logout_redirect_uri);
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
        format!("{}?{}", self.endpoints.logout_endpoint(), query.finish())
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenSet, IdpError> {
        self.token_request(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", self.login_client.client_id.as_str()),
            ("client_secret", self.login_client.client_secret.as_str()),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet, IdpError> {
        self.token_request(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.login_client.client_id.as_str()),
            ("client_secret", self.login_client.client_secret.as_str()),
        ])
        .await
    }

    async fn verify_access_token(&self, token: &str) -> Result<KeycloakClaims, IdpError> {
        let header = decode_header(token)
            .map_err(|_| IdpError::InvalidToken("token is malformed".to_string()))?;

        let (decoding_key, algorithm) = if let Some(kid) = &header.kid {
            self.jwks.get_decoding_key(kid).await?
        } else {
            self.jwks.get_any_decoding_key().await?
        };

        let mut validation = Validation::new(algorithm);
        // exp is enforced against the local clock with no grace period.
        validation.leeway = 0;
        validation.set_issuer(&[self.endpoints.issuer()]);
        // Keycloak puts `account` (or nothing) in `aud` for realm tokens.
        validation.validate_aud = false;

        decode::<KeycloakClaims>(token, &decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => IdpError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    IdpError::InvalidToken("signature is invalid".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    IdpError::InvalidToken("issuer is invalid".to_string())
                }
                jsonwebtoken::errors::ErrorKind::ImmatureSignature => {
                    IdpError::InvalidToken("token is not yet valid".to_string())
                }
                _ => IdpError::InvalidToken("token is malformed".to_string()),
            })
    }

    async fn check_ready(&self) -> Result<(), IdpError> {
        if self.jwks.is_cached().await {
            return Ok(());
        }
        self.jwks.refresh().await.map(|_| ())
    }
}

/// Client-credentials exchange for the admin service client.
pub struct KeycloakCredentialSource {
    token_endpoint: String,
    client: ClientCredentials,
    http: Client,
}

impl KeycloakCredentialSource {
    pub fn new(endpoints: &RealmEndpoints, client: ClientCredentials, http: Client) -> Self {
        Self {
            token_endpoint: endpoints.token_endpoint(),
            client,
            http,
        }
    }
}

#[async_trait]
impl CredentialSource for KeycloakCredentialSource {
    async fn exchange(&self) -> Result<ServiceCredential, IdpError> {
        let requested_at = Instant::now();
        let tokens = post_token_form(
            &self.http,
            &self.token_endpoint,
            &[
                ("grant_type", "client_credentials"),
                ("client_id", self.client.client_id.as_str()),
                ("client_secret", self.client.client_secret.as_str()),
            ],
        )
        .await?;

        let lifetime = tokens
            .expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(DEFAULT_SERVICE_TOKEN_LIFETIME);

        info!(
            client_id = %self.client.client_id,
            lifetime_secs = lifetime.as_secs(),
            "Obtained service credential"
        );

        Ok(ServiceCredential::new(
            tokens.access_token,
            requested_at + lifetime,
        ))
    }
}

/// POST a form to the token endpoint and decode the token response.
async fn post_token_form(
    http: &Client,
    token_endpoint: &str,
    form: &[(&str, &str)],
) -> Result<TokenSet, IdpError> {
    let grant_type = form
        .iter()
        .find(|(k, _)| *k == "grant_type")
        .map(|(_, v)| *v)
        .unwrap_or("unknown");

    let response = http
        .post(token_endpoint)
        .form(form)
        .send()
        .await
        .map_err(|e| IdpError::Unavailable(format!("token request failed: {e}")))?;

    let response = check_token_status(response, grant_type).await?;

    let tokens: TokenSet = response
        .json()
        .await
        .map_err(|e| IdpError::InvalidResponse(format!("invalid token response: {e}")))?;

    if tokens.access_token.trim().is_empty() {
        return Err(IdpError::InvalidResponse(
            "token response did not include access_token".to_string(),
        ));
    }

    debug!(grant_type, "Token endpoint call succeeded");
    Ok(tokens)
}

async fn check_token_status(response: Response, grant_type: &str) -> Result<Response, IdpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status.is_server_error() {
        return Err(IdpError::Unavailable(format!(
            "token endpoint returned HTTP {status}"
        )));
    }

    // Only the OAuth error code is surfaced; the body may echo request data.
    let reason = match response.json::<OAuthErrorResponse>().await {
        Ok(body) => match body.error_description {
            Some(description) => format!("{}: {description}", body.error),
            None => body.error,
        },
        Err(_) => format!("HTTP {status}"),
    };
    Err(IdpError::Rejected(format!("{grant_type} grant refused ({reason})")))
}
