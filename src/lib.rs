// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Realm Gateway - OIDC-protected route gateway
//!
//! This crate puts a small set of routes behind a Keycloak realm: browsers
//! log in through the authorization-code flow, API clients present bearer
//! tokens, and each route declares the realm role it needs.
//!
//! ## Modules
//!
//! - `api` - HTTP handlers and router (Axum)
//! - `auth` - Identity resolution, route policies and the gateway middleware
//! - `passthrough` - Admin REST API relay with a shared service credential
//! - `providers` - Keycloak client behind the `IdentityProvider` trait
//! - `store` - Server-side sessions

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod passthrough;
pub mod providers;
pub mod session_sweeper;
pub mod state;
pub mod store;
