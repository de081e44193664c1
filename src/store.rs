// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session storage.
//!
//! Sessions hold opaque per-browser state keyed by a random identifier. The
//! gateway keeps the authentication grant and any pending login in the
//! attribute map; the store itself knows nothing about either.
//!
//! [`MemorySessionStore`] keeps everything in process memory with an idle
//! timeout, so sessions do not survive a restart. A session may carry a
//! shorter idle timeout of its own, which the store honors.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session attribute {key} could not be encoded: {reason}")]
    Encoding { key: String, reason: String },

    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    pub created_at: DateTime<Utc>,
    pub last_access: DateTime<Utc>,
    /// Overrides the store's idle timeout when shorter
    idle_timeout: Option<Duration>,
    attributes: HashMap<String, serde_json::Value>,
}

impl Session {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            last_access: now,
            idle_timeout: None,
            attributes: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Typed read of an attribute. Values that no longer decode are treated
    /// as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert<T: Serialize>(&mut self, key: &str, value: &T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value).map_err(|e| SessionError::Encoding {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.attributes.insert(key.to_string(), value);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<serde_json::Value> {
        self.attributes.remove(key)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    pub fn set_idle_timeout(&mut self, timeout: Option<Duration>) {
        self.idle_timeout = timeout;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load a live session and mark it accessed.
    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// Insert or replace a session.
    async fn save(&self, session: Session) -> Result<(), SessionError>;

    async fn destroy(&self, id: &str) -> Result<(), SessionError>;

    /// Drop idle sessions, returning how many were removed.
    async fn prune_expired(&self) -> Result<usize, SessionError>;
}

pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    idle_ttl: chrono::Duration,
}

impl MemorySessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_ttl: chrono::Duration::from_std(idle_ttl).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn is_idle(&self, session: &Session, now: DateTime<Utc>) -> bool {
        let ttl = session
            .idle_timeout()
            .and_then(|t| chrono::Duration::from_std(t).ok())
            .map_or(self.idle_ttl, |t| t.min(self.idle_ttl));
        now - session.last_access > ttl
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let idle = match sessions.get(id) {
            Some(session) => self.is_idle(session, now),
            None => return Ok(None),
        };
        if idle {
            sessions.remove(id);
            return Ok(None);
        }

        Ok(sessions.get_mut(id).map(|session| {
            session.last_access = now;
            session.clone()
        }))
    }

    async fn save(&self, mut session: Session) -> Result<(), SessionError> {
        session.last_access = Utc::now();
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<(), SessionError> {
        self.sessions.write().await.remove(id);
        Ok(())
    }

    async fn prune_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_idle(session, now));
        Ok(before - sessions.len())
    }
}
