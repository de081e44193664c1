// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! - Keys are cached for five minutes
//! - An unknown `kid` forces a refresh, which picks up realm key rotation, but
//!   at most once per 30 seconds
//! - Refreshes are serialized; callers queued behind one reuse its result
//! - Encryption keys published next to the signing keys are never used

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::providers::IdpError;

/// Default JWKS cache TTL (5 minutes).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Minimum age of the cached JWKS before an unknown `kid` may refetch it.
const MIN_FORCED_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// JWKS cache entry.
struct CacheEntry {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// JWKS manager with caching.
///
/// Fetches and caches the realm's signing keys for access-token verification.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL (realm `certs` endpoint)
    jwks_url: String,
    /// Cache TTL
    cache_ttl: Duration,
    /// Cached JWKS
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// Held while fetching
    refresh_lock: Arc<Mutex<()>>,
    /// HTTP client (carries the upstream timeout)
    client: reqwest::Client,
}

impl JwksManager {
    pub fn new(jwks_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            jwks_url: jwks_url.into(),
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Arc::new(RwLock::new(None)),
            refresh_lock: Arc::new(Mutex::new(())),
            client,
        }
    }

    async fn cached_younger_than(&self, max_age: Duration) -> Option<JwkSet> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < max_age)
            .map(|entry| entry.jwks.clone())
    }

    /// Fetch JWKS (with caching).
    async fn get_jwks(&self) -> Result<JwkSet, IdpError> {
        if let Some(jwks) = self.cached_younger_than(self.cache_ttl).await {
            return Ok(jwks);
        }
        self.refresh_if_older_than(self.cache_ttl).await
    }

    /// Refetch unless the cache is younger than `max_age`. Checked again
    /// under the refresh lock, so concurrent callers share one fetch.
    async fn refresh_if_older_than(&self, max_age: Duration) -> Result<JwkSet, IdpError> {
        let _guard = self.refresh_lock.lock().await;
        if let Some(jwks) = self.cached_younger_than(max_age).await {
            return Ok(jwks);
        }

        let jwks = self.fetch_jwks().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Ok(jwks)
    }

    /// Fetch JWKS from the endpoint.
    async fn fetch_jwks(&self) -> Result<JwkSet, IdpError> {
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| IdpError::Unavailable(format!("JWKS request failed: {e}")))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(IdpError::Unavailable(format!(
                "HTTP {status} from JWKS endpoint"
            )));
        }
        if !status.is_success() {
            return Err(IdpError::InvalidResponse(format!(
                "HTTP {status} from JWKS endpoint"
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| IdpError::InvalidResponse(format!("JWKS body invalid: {e}")))
    }

    /// Get a decoding key for the given key ID.
    pub async fn get_decoding_key(&self, kid: &str) -> Result<(DecodingKey, Algorithm), IdpError> {
        let jwks = self.get_jwks().await?;
        if let Some(jwk) = find_signing_key(&jwks, kid) {
            return jwk_to_decoding_key(jwk);
        }

        debug!(kid, "Unknown key id, refreshing JWKS");
        let jwks = self
            .refresh_if_older_than(MIN_FORCED_REFRESH_INTERVAL)
            .await?;
        let jwk = find_signing_key(&jwks, kid)
            .ok_or_else(|| IdpError::InvalidToken("no matching key in JWKS".to_string()))?;
        jwk_to_decoding_key(jwk)
    }

    /// Get any valid decoding key (for tokens without kid).
    pub async fn get_any_decoding_key(&self) -> Result<(DecodingKey, Algorithm), IdpError> {
        let jwks = self.get_jwks().await?;

        jwks.keys
            .iter()
            .filter(|k| is_signing_key(k))
            .find_map(|k| jwk_to_decoding_key(k).ok())
            .ok_or_else(|| IdpError::InvalidToken("no usable key in JWKS".to_string()))
    }

    /// Force refresh the JWKS cache.
    pub async fn refresh(&self) -> Result<JwkSet, IdpError> {
        self.refresh_if_older_than(Duration::ZERO).await
    }

    /// Check if JWKS is currently cached and valid.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        if let Some(entry) = &*cache {
            entry.fetched_at.elapsed() < self.cache_ttl
        } else {
            false
        }
    }
}

fn is_signing_key(jwk: &Jwk) -> bool {
    !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption))
        && !matches!(jwk.common.key_algorithm, Some(KeyAlgorithm::RSA_OAEP))
}

fn find_signing_key<'a>(jwks: &'a JwkSet, kid: &str) -> Option<&'a Jwk> {
    jwks.keys
        .iter()
        .filter(|k| is_signing_key(k))
        .find(|k| k.common.key_id.as_deref() == Some(kid))
}

/// Convert a JWK to a DecodingKey.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<(DecodingKey, Algorithm), IdpError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
                .map_err(|e| IdpError::InvalidResponse(format!("bad RSA key in JWKS: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                _ => Algorithm::RS256,
            };

            Ok((key, alg))
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            let key = DecodingKey::from_ec_components(&ec.x, &ec.y)
                .map_err(|e| IdpError::InvalidResponse(format!("bad EC key in JWKS: {e}")))?;

            let alg = match jwk.common.key_algorithm {
                Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                _ => Algorithm::ES256,
            };

            Ok((key, alg))
        }
        _ => Err(IdpError::InvalidResponse(
            "unsupported key type in JWKS".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::{routing::get, Json, Router};

    fn manager() -> JwksManager {
        JwksManager::new(
            "http://idp.example/realms/test/protocol/openid-connect/certs",
            reqwest::Client::new(),
        )
    }

    fn keycloak_jwks() -> JwkSet {
        serde_json::from_value(serde_json::json!({
            "keys": [
                {
                    "kid": "enc-key",
                    "kty": "RSA",
                    "alg": "RSA-OAEP",
                    "use": "enc",
                    "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
                    "e": "AQAB"
                },
                {
                    "kid": "sig-key",
                    "kty": "RSA",
                    "alg": "RS256",
                    "use": "sig",
                    "n": "sXchDaQebHnPiGvyDOAT4saGEUetSyo9MKLOoWFsueri23bOdgWp4Dy1WlUzewbgBHod5pcM9H95GQRV3JDXboIRROSBigeC5yjU1hGzHHyXss8UDprecbAYxknTcQkhslANGRUZmdTOQ5qTRsLAt6BTYuyvVRdhS8exSZEy_c4gs_7svlJJQ4H9_NxsiIoLwAEk7-Q3UXERGYw_75IDrGA84-lA_-Ct4eTlXHBIY2EaV7t7LjJaynVJCpkv4LKjTTAumiGUIuQhrNhZLuF_RJLqHpM2kgWFLU7-VTdL1VbC2tejvcI2BlMkEpk1BzBZI0KQB0GaDWFLN-aEAw3vRw",
                    "e": "AQAB"
                }
            ]
        }))
        .unwrap()
    }

    /// Serves `keycloak_jwks()` and counts fetches.
    async fn spawn_certs_endpoint() -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/realms/test/protocol/openid-connect/certs",
            get(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Json(keycloak_jwks())
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (
            format!("http://{addr}/realms/test/protocol/openid-connect/certs"),
            hits,
        )
    }

    #[test]
    fn jwks_manager_creation() {
        let manager = manager();
        assert_eq!(manager.cache_ttl, DEFAULT_CACHE_TTL);
    }

    #[tokio::test]
    async fn unknown_kids_do_not_refetch_fresh_keys() {
        let (url, hits) = spawn_certs_endpoint().await;
        let manager = JwksManager::new(url, reqwest::Client::new());

        for i in 0..20 {
            let err = manager
                .get_decoding_key(&format!("made-up-{i}"))
                .await
                .unwrap_err();
            assert_eq!(err, IdpError::InvalidToken("no matching key in JWKS".to_string()));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(manager.get_decoding_key("sig-key").await.is_ok());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_cold_lookups_share_one_fetch() {
        let (url, hits) = spawn_certs_endpoint().await;
        let manager = JwksManager::new(url, reqwest::Client::new());

        let results = futures_util::future::join_all(
            (0..10).map(|i| {
                let manager = manager.clone();
                async move { manager.get_decoding_key(&format!("made-up-{i}")).await }
            }),
        )
        .await;

        assert!(results
            .iter()
            .all(|r| matches!(r, Err(IdpError::InvalidToken(_)))));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(manager.is_cached().await);
    }

    #[tokio::test]
    async fn explicit_refresh_always_fetches() {
        let (url, hits) = spawn_certs_endpoint().await;
        let manager = JwksManager::new(url, reqwest::Client::new());

        manager.refresh().await.unwrap();
        manager.refresh().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cache_initially_empty() {
        assert!(!manager().is_cached().await);
    }

    #[test]
    fn encryption_keys_are_skipped() {
        let jwks = keycloak_jwks();
        assert!(find_signing_key(&jwks, "enc-key").is_none());
        assert!(find_signing_key(&jwks, "sig-key").is_some());
    }

    #[test]
    fn rsa_signing_key_converts() {
        let jwks = keycloak_jwks();
        let jwk = find_signing_key(&jwks, "sig-key").unwrap();
        let (_, alg) = jwk_to_decoding_key(jwk).unwrap();
        assert_eq!(alg, Algorithm::RS256);
    }
}
