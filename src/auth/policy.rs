// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Route authorization policies.

use std::collections::HashMap;

use super::claims::AuthenticationGrant;

/// Realm role required by the admin routes.
pub const ADMIN_ROLE: &str = "admin";

/// Per-route authorization requirement.
///
/// ## Evaluation
///
/// - `Public` - always passes, identity is optional
/// - `Authenticated` - passes for any resolved grant
/// - `HasRole` - passes only if the grant lists the realm role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteAuthorizationPolicy {
    Public,
    Authenticated,
    HasRole(String),
}

/// Outcome of evaluating a policy against a resolved identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyDecision {
    Allow,
    /// No grant was resolved
    Unauthenticated,
    /// A grant was resolved but lacks the required role
    Forbidden,
}

impl RouteAuthorizationPolicy {
    pub fn has_role(role: impl Into<String>) -> Self {
        RouteAuthorizationPolicy::HasRole(role.into())
    }

    pub fn evaluate(&self, grant: Option<&AuthenticationGrant>) -> PolicyDecision {
        match (self, grant) {
            (RouteAuthorizationPolicy::Public, _) => PolicyDecision::Allow,
            (_, None) => PolicyDecision::Unauthenticated,
            (RouteAuthorizationPolicy::Authenticated, Some(_)) => PolicyDecision::Allow,
            (RouteAuthorizationPolicy::HasRole(role), Some(grant)) => {
                if grant.has_role(role) {
                    PolicyDecision::Allow
                } else {
                    PolicyDecision::Forbidden
                }
            }
        }
    }

    pub fn is_public(&self) -> bool {
        matches!(self, RouteAuthorizationPolicy::Public)
    }
}

impl std::fmt::Display for RouteAuthorizationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteAuthorizationPolicy::Public => write!(f, "public"),
            RouteAuthorizationPolicy::Authenticated => write!(f, "authenticated"),
            RouteAuthorizationPolicy::HasRole(role) => write!(f, "role:{role}"),
        }
    }
}

/// Route path to policy mapping, fixed at startup.
///
/// Keys are axum route templates (the value of `MatchedPath`). Routes that are
/// not listed require an authenticated identity.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    routes: HashMap<String, RouteAuthorizationPolicy>,
}

impl PolicyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, policy: RouteAuthorizationPolicy) -> Self {
        self.routes.insert(path.into(), policy);
        self
    }

    pub fn policy_for(&self, path: Option<&str>) -> &RouteAuthorizationPolicy {
        path.and_then(|p| self.routes.get(p))
            .unwrap_or(&RouteAuthorizationPolicy::Authenticated)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::claims::tests::sample_grant;

    #[test]
    fn public_allows_everyone() {
        let policy = RouteAuthorizationPolicy::Public;
        assert_eq!(policy.evaluate(None), PolicyDecision::Allow);
        assert_eq!(
            policy.evaluate(Some(&sample_grant(&[]))),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn authenticated_requires_a_grant() {
        let policy = RouteAuthorizationPolicy::Authenticated;
        assert_eq!(policy.evaluate(None), PolicyDecision::Unauthenticated);
        assert_eq!(
            policy.evaluate(Some(&sample_grant(&[]))),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn has_role_distinguishes_missing_grant_from_missing_role() {
        let policy = RouteAuthorizationPolicy::has_role(ADMIN_ROLE);
        assert_eq!(policy.evaluate(None), PolicyDecision::Unauthenticated);
        assert_eq!(
            policy.evaluate(Some(&sample_grant(&["user"]))),
            PolicyDecision::Forbidden
        );
        assert_eq!(
            policy.evaluate(Some(&sample_grant(&["user", "admin"]))),
            PolicyDecision::Allow
        );
    }

    #[test]
    fn role_match_is_exact() {
        let policy = RouteAuthorizationPolicy::has_role("admin");
        assert_eq!(
            policy.evaluate(Some(&sample_grant(&["Admin", "realm-admin"]))),
            PolicyDecision::Forbidden
        );
    }

    #[test]
    fn unlisted_routes_require_authentication() {
        let table = PolicyTable::new().with("/", RouteAuthorizationPolicy::Public);
        assert_eq!(table.policy_for(Some("/")), &RouteAuthorizationPolicy::Public);
        assert_eq!(
            table.policy_for(Some("/unknown")),
            &RouteAuthorizationPolicy::Authenticated
        );
        assert_eq!(table.policy_for(None), &RouteAuthorizationPolicy::Authenticated);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(RouteAuthorizationPolicy::has_role("admin").to_string(), "role:admin");
        assert_eq!(RouteAuthorizationPolicy::Public.to_string(), "public");
    }
}
