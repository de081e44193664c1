// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup. Any missing
//! required variable is a [`ConfigError`] and the process exits before it
//! binds a listener.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `SESSION_SECRET` | Key used to sign session cookies | Required |
//! | `KEYCLOAK_AUTH_SERVER_URL` | Identity provider base URL | Required |
//! | `KEYCLOAK_REALM` | Realm name | Required |
//! | `KEYCLOAK_CLIENT_ID` | Client used for interactive login | Required |
//! | `KEYCLOAK_CLIENT_SECRET` | Secret of the interactive client | Required |
//! | `KEYCLOAK_ADMIN_CLIENT_ID` | Service client for the admin API | Required |
//! | `KEYCLOAK_ADMIN_CLIENT_SECRET` | Secret of the service client | Required |
//! | `PUBLIC_BASE_URL` | External URL of this server (callback target) | `http://localhost:3000` |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3000` |
//! | `UPSTREAM_TIMEOUT_SECS` | Timeout for every identity-provider call | `10` |
//! | `SESSION_TTL_SECS` | Idle lifetime of a session | `1800` |
//! | `COOKIE_SECURE` | Mark the session cookie `Secure` | `false` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::SocketAddr;
use std::time::Duration;

pub const SESSION_SECRET_ENV: &str = "SESSION_SECRET";
pub const AUTH_SERVER_URL_ENV: &str = "KEYCLOAK_AUTH_SERVER_URL";
pub const REALM_ENV: &str = "KEYCLOAK_REALM";
pub const CLIENT_ID_ENV: &str = "KEYCLOAK_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "KEYCLOAK_CLIENT_SECRET";
pub const ADMIN_CLIENT_ID_ENV: &str = "KEYCLOAK_ADMIN_CLIENT_ID";
pub const ADMIN_CLIENT_SECRET_ENV: &str = "KEYCLOAK_ADMIN_CLIENT_SECRET";
pub const PUBLIC_BASE_URL_ENV: &str = "PUBLIC_BASE_URL";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const UPSTREAM_TIMEOUT_ENV: &str = "UPSTREAM_TIMEOUT_SECS";
pub const SESSION_TTL_ENV: &str = "SESSION_TTL_SECS";
pub const COOKIE_SECURE_ENV: &str = "COOKIE_SECURE";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 10;
const DEFAULT_SESSION_TTL_SECS: u64 = 1800;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("environment variable {name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Identity provider coordinates: base URL plus realm.
///
/// Every URL this server redirects to or calls is derived from these two
/// values, so the derivations live here and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealmEndpoints {
    base_url: String,
    realm: String,
}

impl RealmEndpoints {
    pub fn new(base_url: impl Into<String>, realm: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            realm: realm.into(),
        }
    }

    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// `{base}/realms/{realm}`, which is also the token issuer.
    pub fn realm_url(&self) -> String {
        format!("{}/realms/{}", self.base_url, self.realm)
    }

    pub fn issuer(&self) -> String {
        self.realm_url()
    }

    fn openid_connect(&self, endpoint: &str) -> String {
        format!("{}/protocol/openid-connect/{endpoint}", self.realm_url())
    }

    pub fn authorization_endpoint(&self) -> String {
        self.openid_connect("auth")
    }

    pub fn token_endpoint(&self) -> String {
        self.openid_connect("token")
    }

    pub fn logout_endpoint(&self) -> String {
        self.openid_connect("logout")
    }

    pub fn jwks_uri(&self) -> String {
        self.openid_connect("certs")
    }

    pub fn account_console(&self) -> String {
        format!("{}/account", self.realm_url())
    }

    pub fn reset_credentials(&self, client_id: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(client_id.as_bytes()).collect();
        format!(
            "{}/login-actions/reset-credentials?client_id={encoded}",
            self.realm_url()
        )
    }

    pub fn admin_users(&self) -> String {
        format!("{}/admin/realms/{}/users", self.base_url, self.realm)
    }
}

/// OAuth client id and secret pair.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Clone)]
pub struct GatewayConfig {
    pub session_secret: String,
    pub endpoints: RealmEndpoints,
    pub login_client: ClientCredentials,
    pub admin_client: ClientCredentials,
    pub public_base_url: String,
    pub host: String,
    pub port: u16,
    pub upstream_timeout: Duration,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("session_secret", &"<redacted>")
            .field("endpoints", &self.endpoints)
            .field("login_client", &self.login_client)
            .field("admin_client", &self.admin_client)
            .field("public_base_url", &self.public_base_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upstream_timeout", &self.upstream_timeout)
            .field("session_ttl", &self.session_ttl)
            .field("cookie_secure", &self.cookie_secure)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl GatewayConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let required = |name: &'static str| value(name).ok_or(ConfigError::Missing(name));

        let session_secret = required(SESSION_SECRET_ENV)?;
        let base_url = required(AUTH_SERVER_URL_ENV)?;
        url::Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            name: AUTH_SERVER_URL_ENV,
            reason: e.to_string(),
        })?;
        let realm = required(REALM_ENV)?;

        let login_client = ClientCredentials {
            client_id: required(CLIENT_ID_ENV)?,
            client_secret: required(CLIENT_SECRET_ENV)?,
        };
        let admin_client = ClientCredentials {
            client_id: required(ADMIN_CLIENT_ID_ENV)?,
            client_secret: required(ADMIN_CLIENT_SECRET_ENV)?,
        };

        let public_base_url = value(PUBLIC_BASE_URL_ENV)
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&public_base_url).map_err(|e| ConfigError::Invalid {
            name: PUBLIC_BASE_URL_ENV,
            reason: e.to_string(),
        })?;

        let host = value(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(value(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let upstream_timeout = Duration::from_secs(parse_or(
            value(UPSTREAM_TIMEOUT_ENV),
            UPSTREAM_TIMEOUT_ENV,
            DEFAULT_UPSTREAM_TIMEOUT_SECS,
        )?);
        let session_ttl = Duration::from_secs(parse_or(
            value(SESSION_TTL_ENV),
            SESSION_TTL_ENV,
            DEFAULT_SESSION_TTL_SECS,
        )?);
        let cookie_secure = parse_or(value(COOKIE_SECURE_ENV), COOKIE_SECURE_ENV, false)?;

        let log_format = match value(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            session_secret,
            endpoints: RealmEndpoints::new(base_url, realm),
            login_client,
            admin_client,
            public_base_url,
            host,
            port,
            upstream_timeout,
            session_ttl,
            cookie_secure,
            log_format,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                name: HOST_ENV,
                reason: e.to_string(),
            })
    }

    /// Redirect URI registered with the identity provider for the code flow.
    pub fn callback_url(&self) -> String {
        format!("{}/auth/callback", self.public_base_url)
    }
}

fn parse_or<T>(raw: Option<String>, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
