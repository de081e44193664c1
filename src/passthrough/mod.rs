// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Admin-API Passthrough
//!
//! Relays the realm's user listing to admin callers. The upstream call is
//! authenticated with a service credential from a client-credentials
//! exchange, never with the caller's own grant.
//!
//! ## Flow
//!
//! 1. [`ServiceCredentialCache::get`] returns the cached credential or runs a
//!    single shared exchange
//! 2. [`AdminApiClient::list_users`] calls `GET /admin/realms/{realm}/users`
//! 3. The body is handed back unchanged

pub mod admin_client;
pub mod credential_cache;

pub use admin_client::{AdminApiClient, AdminApiError};
pub use credential_cache::{CredentialSource, ServiceCredential, ServiceCredentialCache};
