// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Signed session cookie.
//!
//! The cookie value is `{session_id}.{signature}` where the signature is the
//! unpadded base64url HMAC-SHA256 of the session ID under the session secret.
//! A cookie whose signature does not verify is ignored.

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use base64ct::{Base64UrlUnpadded, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE_NAME: &str = "gateway.sid";

#[derive(Clone)]
pub struct SessionCookie {
    secret: Vec<u8>,
    secure: bool,
}

impl SessionCookie {
    pub fn new(secret: &str, secure: bool) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            secure,
        }
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }

    /// Signed cookie value for a session ID.
    pub fn sign(&self, session_id: &str) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(session_id.as_bytes());
        let signature = Base64UrlUnpadded::encode_string(&mac.finalize().into_bytes());
        Some(format!("{session_id}.{signature}"))
    }

    /// Session ID from a signed value, if the signature verifies.
    pub fn verify(&self, value: &str) -> Option<String> {
        let (session_id, signature) = value.rsplit_once('.')?;
        let signature = Base64UrlUnpadded::decode_vec(signature).ok()?;

        let mut mac = self.mac()?;
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).ok()?;
        Some(session_id.to_string())
    }

    /// Verified session ID from the request's `Cookie` headers.
    pub fn session_id(&self, headers: &HeaderMap) -> Option<String> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .filter(|(name, _)| *name == SESSION_COOKIE_NAME)
            .find_map(|(_, value)| self.verify(value))
    }

    /// `Set-Cookie` value that binds the browser to a session.
    pub fn set_header(&self, session_id: &str) -> Option<HeaderValue> {
        let value = self.sign(session_id)?;
        let secure = if self.secure { "; Secure" } else { "" };
        HeaderValue::from_str(&format!(
            "{SESSION_COOKIE_NAME}={value}; Path=/; HttpOnly; SameSite=Lax{secure}"
        ))
        .ok()
    }

    /// `Set-Cookie` value that deletes the session cookie.
    pub fn clear_header(&self) -> HeaderValue {
        HeaderValue::from_static(
            "gateway.sid=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie() -> SessionCookie {
        SessionCookie::new("test-secret", false)
    }

    #[test]
    fn signed_value_verifies() {
        let signed = cookie().sign("abc-123").unwrap();
        assert!(signed.starts_with("abc-123."));
        assert_eq!(cookie().verify(&signed).as_deref(), Some("abc-123"));
    }

    #[test]
    fn tampered_id_is_rejected() {
        let signed = cookie().sign("abc-123").unwrap();
        let forged = signed.replacen("abc-123", "abc-124", 1);
        assert!(cookie().verify(&forged).is_none());
    }

    #[test]
    fn other_secret_is_rejected() {
        let signed = SessionCookie::new("other", false).sign("abc-123").unwrap();
        assert!(cookie().verify(&signed).is_none());
    }

    #[test]
    fn unsigned_value_is_rejected() {
        assert!(cookie().verify("abc-123").is_none());
        assert!(cookie().verify("abc-123.!!!").is_none());
    }

    #[test]
    fn session_id_found_among_other_cookies() {
        let signed = cookie().sign("sess-1").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!("theme=dark; {SESSION_COOKIE_NAME}={signed}; lang=en"))
                .unwrap(),
        );
        assert_eq!(cookie().session_id(&headers).as_deref(), Some("sess-1"));
    }

    #[test]
    fn set_header_marks_secure_when_configured() {
        let plain = cookie().set_header("s").unwrap();
        assert!(!plain.to_str().unwrap().contains("Secure"));
        let secure = SessionCookie::new("test-secret", true).set_header("s").unwrap();
        assert!(secure.to_str().unwrap().ends_with("; Secure"));
        assert!(secure.to_str().unwrap().contains("HttpOnly"));
    }

    #[test]
    fn clear_header_expires_cookie() {
        let value = cookie().clear_header();
        assert!(value.to_str().unwrap().starts_with(&format!("{SESSION_COOKIE_NAME}=;")));
        assert!(value.to_str().unwrap().contains("Max-Age=0"));
    }
}
