//! Per-request authorization gate: decision derivation plus the route policy
//! that turns a decision into an action. Fail closed: any provider failure or
//! malformed session resolves to Anonymous before this module is consulted.

use crate::allowlist::AllowList;

use super::principal::Principal;
use super::provider::ProviderUser;

/// Terminal per-request outcome. Derived on every request, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthzDecision {
    Anonymous,
    NonAdmin,
    Admin,
}

/// Paths that require an admin session. Matched by prefix.
pub const PROTECTED_ROUTES: &[&str] = &["/dashboard", "/users", "/settings"];

/// Auth pages that bounce already-authenticated admins to the landing page.
pub const AUTH_ROUTES: &[&str] = &["/login"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateAction {
    Allow,
    /// Send to the login page, preserving the originally requested path.
    RedirectToLogin { next: String },
    RedirectToLanding,
    /// Tear the session down before redirecting; never leave a non-admin
    /// session dangling.
    InvalidateAndRedirect,
}

#[derive(Debug, Clone)]
pub struct RoutePolicy {
    pub protected: Vec<String>,
    pub auth: Vec<String>,
    pub login_path: String,
    pub landing_path: String,
}

impl Default for RoutePolicy {
    fn default() -> Self {
        Self {
            protected: PROTECTED_ROUTES.iter().map(|s| s.to_string()).collect(),
            auth: AUTH_ROUTES.iter().map(|s| s.to_string()).collect(),
            login_path: "/login".to_string(),
            landing_path: "/dashboard".to_string(),
        }
    }
}

impl RoutePolicy {
    pub fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|r| path.starts_with(r.as_str()))
    }

    pub fn is_auth(&self, path: &str) -> bool {
        self.auth.iter().any(|r| path.starts_with(r.as_str()))
    }

    /// Apply the policy. Invalidation takes precedence for authenticated
    /// non-admins on any gated path.
    pub fn decide(&self, path: &str, decision: AuthzDecision) -> GateAction {
        let gated = self.is_protected(path) || self.is_auth(path);
        if decision == AuthzDecision::NonAdmin && gated {
            return GateAction::InvalidateAndRedirect;
        }
        if self.is_protected(path) && decision != AuthzDecision::Admin {
            return GateAction::RedirectToLogin { next: path.to_string() };
        }
        if self.is_auth(path) && decision == AuthzDecision::Admin {
            return GateAction::RedirectToLanding;
        }
        GateAction::Allow
    }
}

/// Derive the decision for an optional provider user. Admin status is
/// recomputed from the allow-list on every call; nothing cached from earlier
/// requests is consulted.
pub fn evaluate(
    admins: &AllowList,
    user: Option<&ProviderUser>,
) -> (AuthzDecision, Option<Principal>) {
    match user {
        None => (AuthzDecision::Anonymous, None),
        Some(user) => {
            let admin = admins.is_admin(user.email.as_deref());
            let principal = Principal::from_user(user, admin);
            let decision = if admin { AuthzDecision::Admin } else { AuthzDecision::NonAdmin };
            (decision, Some(principal))
        }
    }
}
