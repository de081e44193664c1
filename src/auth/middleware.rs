// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Auth gateway middleware.
//!
//! Every routed request passes through [`enforce`], which:
//!
//! 1. Looks up the route's policy in the [`PolicyTable`]
//! 2. Resolves the caller's identity from a bearer token or the session
//! 3. Evaluates the policy
//! 4. Inserts an immutable [`RequestIdentity`] into the request extensions
//!    and runs the handler, or short-circuits with a challenge, a 403 or a 503
//!
//! Expired session grants are refreshed here, so handlers only ever observe
//! unexpired grants.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{MatchedPath, Request, State},
    http::{
        header::{AUTHORIZATION, LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::claims::{AuthenticationGrant, TokenSet};
use super::cookie::SessionCookie;
use super::policy::{PolicyDecision, PolicyTable, RouteAuthorizationPolicy};
use super::AuthError;
use crate::providers::{IdentityProvider, IdpError};
use crate::store::{Session, SessionError, SessionStore};

/// Session attribute holding the [`AuthenticationGrant`].
pub const GRANT_KEY: &str = "auth.grant";
/// Session attribute holding the [`PendingLogin`] list.
pub const PENDING_LOGIN_KEY: &str = "auth.pending_login";

/// Logins a session may have in flight at once (one per tab); the oldest is
/// dropped beyond this.
const MAX_PENDING_LOGINS: usize = 5;

/// Idle timeout of a session that holds nothing but pending logins.
const LOGIN_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Login started by a challenge and not yet completed by the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingLogin {
    pub state: String,
    /// Local path to return to after login
    pub return_to: String,
}

/// Identity attached to a request by the gateway.
///
/// Immutable for the lifetime of the request.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentity {
    grant: Option<Arc<AuthenticationGrant>>,
}

impl RequestIdentity {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(grant: AuthenticationGrant) -> Self {
        Self {
            grant: Some(Arc::new(grant)),
        }
    }

    pub fn grant(&self) -> Option<&Arc<AuthenticationGrant>> {
        self.grant.as_ref()
    }
}

/// How the caller presented (or failed to present) credentials.
enum Presented {
    Bearer(String),
    Session(Option<Session>),
}

/// Outcome of identity resolution.
struct Resolved {
    grant: Option<AuthenticationGrant>,
    /// Session the request is bound to, if any
    session: Option<Session>,
    bearer: bool,
}

/// Result of a completed login callback.
pub struct CompletedLogin {
    pub return_to: String,
    pub set_cookie: HeaderValue,
}

#[derive(Clone)]
pub struct AuthGateway {
    provider: Arc<dyn IdentityProvider>,
    sessions: Arc<dyn SessionStore>,
    cookie: SessionCookie,
    policies: Arc<PolicyTable>,
    callback_url: String,
}

impl AuthGateway {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        sessions: Arc<dyn SessionStore>,
        cookie: SessionCookie,
        policies: PolicyTable,
        callback_url: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            sessions,
            cookie,
            policies: Arc::new(policies),
            callback_url: callback_url.into(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn IdentityProvider> {
        &self.provider
    }

    pub fn policy_for(&self, path: Option<&str>) -> &RouteAuthorizationPolicy {
        self.policies.policy_for(path)
    }

    async fn presented(&self, headers: &HeaderMap) -> Result<Presented, AuthError> {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string());
        if let Some(token) = bearer {
            return Ok(Presented::Bearer(token));
        }

        let session = match self.cookie.session_id(headers) {
            Some(id) => self.sessions.load(&id).await.map_err(session_failure)?,
            None => None,
        };
        Ok(Presented::Session(session))
    }

    async fn resolve(&self, headers: &HeaderMap) -> Result<Resolved, AuthError> {
        match self.presented(headers).await? {
            Presented::Bearer(token) => {
                let grant = self.verify(token, None).await?;
                Ok(Resolved {
                    grant: Some(grant),
                    session: None,
                    bearer: true,
                })
            }
            Presented::Session(None) => Ok(Resolved {
                grant: None,
                session: None,
                bearer: false,
            }),
            Presented::Session(Some(session)) => self.resolve_session(session).await,
        }
    }

    /// Verify an access token and build a grant from it.
    async fn verify(
        &self,
        access_token: String,
        tokens: Option<&TokenSet>,
    ) -> Result<AuthenticationGrant, AuthError> {
        let claims = self
            .provider
            .verify_access_token(&access_token)
            .await
            .map_err(provider_failure)?;
        Ok(AuthenticationGrant::from_claims(
            claims,
            access_token,
            tokens,
            Utc::now().timestamp(),
        ))
    }

    async fn resolve_session(&self, mut session: Session) -> Result<Resolved, AuthError> {
        let now = Utc::now().timestamp();
        let grant = match session.get::<AuthenticationGrant>(GRANT_KEY) {
            Some(grant) if !grant.is_expired(now) => Some(grant),
            Some(expired) => {
                let refreshed = self.refresh(&expired, now).await?;
                match &refreshed {
                    Some(grant) => session.insert(GRANT_KEY, grant).map_err(session_failure)?,
                    None => {
                        session.remove(GRANT_KEY);
                    }
                }
                self.sessions
                    .save(session.clone())
                    .await
                    .map_err(session_failure)?;
                refreshed
            }
            None => None,
        };

        Ok(Resolved {
            grant,
            session: Some(session),
            bearer: false,
        })
    }

    /// Refresh an expired grant. `Ok(None)` means the grant is gone for good.
    async fn refresh(
        &self,
        expired: &AuthenticationGrant,
        now: i64,
    ) -> Result<Option<AuthenticationGrant>, AuthError> {
        let Some(refresh_token) = expired
            .refresh_token
            .as_deref()
            .filter(|_| expired.can_refresh(now))
        else {
            debug!(subject = %expired.subject, "Grant expired without usable refresh token");
            return Ok(None);
        };

        let tokens = match self.provider.refresh(refresh_token).await {
            Ok(tokens) => tokens,
            Err(IdpError::Unavailable(msg)) => return Err(AuthError::UpstreamUnavailable(msg)),
            Err(e) => {
                info!(subject = %expired.subject, error = %e, "Refresh refused, dropping grant");
                return Ok(None);
            }
        };

        match self.verify(tokens.access_token.clone(), Some(&tokens)).await {
            Ok(mut grant) => {
                // Keycloak may omit these on refresh; keep the previous ones.
                if grant.refresh_token.is_none() {
                    grant.refresh_token = expired.refresh_token.clone();
                    grant.refresh_expires_at = expired.refresh_expires_at;
                }
                if grant.id_token.is_none() {
                    grant.id_token = expired.id_token.clone();
                }
                debug!(subject = %grant.subject, "Refreshed grant");
                Ok(Some(grant))
            }
            Err(e @ AuthError::UpstreamUnavailable(_)) => Err(e),
            Err(e) => {
                warn!(subject = %expired.subject, error = %e, "Refreshed token failed verification");
                Ok(None)
            }
        }
    }

    /// Start the interactive login: remember where the caller was going and
    /// redirect to the identity provider.
    async fn challenge(&self, session: Option<Session>, return_to: &str) -> Response {
        let mut session = session.unwrap_or_default();
        let state = Uuid::new_v4().simple().to_string();

        let mut pending = pending_logins(&session);
        pending.push(PendingLogin {
            state: state.clone(),
            return_to: return_to.to_string(),
        });
        if pending.len() > MAX_PENDING_LOGINS {
            pending.drain(..pending.len() - MAX_PENDING_LOGINS);
        }
        if let Err(e) = store_pending_logins(&mut session, &pending) {
            return session_failure(e).into_response();
        }
        // No usable grant here, so the session only matters for the login.
        session.set_idle_timeout(Some(LOGIN_IDLE_TIMEOUT));
        let session_id = session.id().to_string();
        if let Err(e) = self.sessions.save(session).await {
            return session_failure(e).into_response();
        }

        let Some(set_cookie) = self.cookie.set_header(&session_id) else {
            return AuthError::InternalError("session cookie could not be signed".to_string())
                .into_response();
        };
        let location = self.provider.authorization_url(&state, &self.callback_url);
        redirect_with_cookie(&location, set_cookie)
    }

    /// Finish the authorization-code flow started by [`Self::challenge`].
    ///
    /// The session is replaced by a fresh one on success so a session ID seen
    /// before login is worthless afterwards. Logins still pending in other
    /// tabs move to the fresh session.
    pub async fn complete_login(
        &self,
        headers: &HeaderMap,
        code: &str,
        state: &str,
    ) -> Result<CompletedLogin, AuthError> {
        let mut session = match self.cookie.session_id(headers) {
            Some(id) => self.sessions.load(&id).await.map_err(session_failure)?,
            None => None,
        }
        .ok_or_else(|| AuthError::InvalidCallback("no login in progress".to_string()))?;

        let mut pending = pending_logins(&session);
        if pending.is_empty() {
            return Err(AuthError::InvalidCallback("no login in progress".to_string()));
        }
        let index = pending
            .iter()
            .position(|login| login.state == state)
            .ok_or_else(|| AuthError::InvalidCallback("state mismatch".to_string()))?;
        let login = pending.remove(index);
        store_pending_logins(&mut session, &pending).map_err(session_failure)?;
        self.sessions
            .save(session.clone())
            .await
            .map_err(session_failure)?;

        let tokens = self
            .provider
            .exchange_code(code, &self.callback_url)
            .await
            .map_err(|e| match e {
                IdpError::Unavailable(msg) => AuthError::UpstreamUnavailable(msg),
                other => AuthError::InvalidCallback(other.to_string()),
            })?;
        let grant = self.verify(tokens.access_token.clone(), Some(&tokens)).await?;

        let mut fresh = Session::new();
        fresh.insert(GRANT_KEY, &grant).map_err(session_failure)?;
        store_pending_logins(&mut fresh, &pending).map_err(session_failure)?;
        let fresh_id = fresh.id().to_string();
        self.sessions.save(fresh).await.map_err(session_failure)?;
        self.sessions
            .destroy(session.id())
            .await
            .map_err(session_failure)?;

        info!(subject = %grant.subject, "Login completed");

        let set_cookie = self.cookie.set_header(&fresh_id).ok_or_else(|| {
            AuthError::InternalError("session cookie could not be signed".to_string())
        })?;
        Ok(CompletedLogin {
            return_to: login.return_to,
            set_cookie,
        })
    }

    /// Destroy the caller's session and return the provider's logout URL.
    pub async fn logout(
        &self,
        headers: &HeaderMap,
        post_logout_redirect_uri: &str,
    ) -> Result<String, AuthError> {
        let session = match self.cookie.session_id(headers) {
            Some(id) => self.sessions.load(&id).await.map_err(session_failure)?,
            None => None,
        };

        let mut id_token_hint = None;
        if let Some(session) = session {
            id_token_hint = session
                .get::<AuthenticationGrant>(GRANT_KEY)
                .and_then(|grant| grant.id_token);
            self.sessions
                .destroy(session.id())
                .await
                .map_err(session_failure)?;
            debug!("Session destroyed on logout");
        }

        Ok(self
            .provider
            .logout_url(id_token_hint.as_deref(), post_logout_redirect_uri))
    }

    pub fn clear_cookie(&self) -> HeaderValue {
        self.cookie.clear_header()
    }
}

/// Gateway middleware. Install with `Router::route_layer` so `MatchedPath`
/// is available.
pub async fn enforce(
    State(gateway): State<AuthGateway>,
    mut request: Request,
    next: Next,
) -> Response {
    let matched = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string());
    let policy = gateway.policy_for(matched.as_deref()).clone();

    let resolved = match gateway.resolve(request.headers()).await {
        Ok(resolved) => resolved,
        Err(e) if policy.is_public() => {
            debug!(error = %e, "Identity resolution failed on public route");
            Resolved {
                grant: None,
                session: None,
                bearer: false,
            }
        }
        Err(e) => {
            if e.is_retryable() {
                warn!(route = matched.as_deref().unwrap_or("-"), "Identity provider unavailable");
            }
            return e.into_response();
        }
    };

    match policy.evaluate(resolved.grant.as_ref()) {
        PolicyDecision::Allow => {
            let identity = match resolved.grant {
                Some(grant) => RequestIdentity::authenticated(grant),
                None => RequestIdentity::anonymous(),
            };
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        PolicyDecision::Forbidden => {
            debug!(route = matched.as_deref().unwrap_or("-"), %policy, "Role missing");
            AuthError::Forbidden.into_response()
        }
        PolicyDecision::Unauthenticated if resolved.bearer => {
            AuthError::Unauthenticated.into_response()
        }
        PolicyDecision::Unauthenticated => {
            let return_to = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            gateway.challenge(resolved.session, &return_to).await
        }
    }
}

pub(crate) fn redirect_with_cookie(location: &str, set_cookie: HeaderValue) -> Response {
    let mut response = redirect(location);
    response.headers_mut().insert(SET_COOKIE, set_cookie);
    response
}

/// 302 redirect, matching the status Express uses for `res.redirect`.
pub(crate) fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::FOUND, [(LOCATION, location)]).into_response(),
        Err(_) => AuthError::InternalError("redirect target is not a valid header".to_string())
            .into_response(),
    }
}

fn pending_logins(session: &Session) -> Vec<PendingLogin> {
    session.get(PENDING_LOGIN_KEY).unwrap_or_default()
}

fn store_pending_logins(session: &mut Session, pending: &[PendingLogin]) -> Result<(), SessionError> {
    if pending.is_empty() {
        session.remove(PENDING_LOGIN_KEY);
        Ok(())
    } else {
        session.insert(PENDING_LOGIN_KEY, &pending)
    }
}

fn provider_failure(e: IdpError) -> AuthError {
    match e {
        IdpError::Unavailable(msg) | IdpError::InvalidResponse(msg) => {
            AuthError::UpstreamUnavailable(msg)
        }
        IdpError::TokenExpired => AuthError::TokenExpired,
        IdpError::InvalidToken(msg) | IdpError::Rejected(msg) => AuthError::InvalidToken(msg),
    }
}

fn session_failure(e: SessionError) -> AuthError {
    match e {
        SessionError::Unavailable(msg) => AuthError::UpstreamUnavailable(msg),
        SessionError::Encoding { .. } => AuthError::InternalError(e.to_string()),
    }
}
