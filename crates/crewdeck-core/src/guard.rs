//! Route gating for front ends.
//!
//! The guard is advisory: it looks at a session snapshot and tells the caller
//! whether to render a route, show a placeholder, or navigate elsewhere.

use std::collections::BTreeSet;

use crate::session::AuthSnapshot;

const DEFAULT_LOGIN_ROUTE: &str = "/login";
const DEFAULT_HOME_ROUTE: &str = "/";
const DEFAULT_RESET_ROUTE: &str = "/reset-password";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// Session state is still settling; show a placeholder.
    Loading,
    /// Render nothing and navigate to the given route.
    Redirect(String),
}

#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_route: String,
    home_route: String,
    public_routes: BTreeSet<String>,
}

impl Default for RouteGuard {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_ROUTE, DEFAULT_HOME_ROUTE)
            .with_public_route(DEFAULT_RESET_ROUTE)
    }
}

impl RouteGuard {
    /// Guard with the given login and home routes. The login route is always public.
    pub fn new(login_route: &str, home_route: &str) -> Self {
        let login_route = normalize(login_route);
        let mut public_routes = BTreeSet::new();
        public_routes.insert(login_route.clone());
        Self {
            login_route,
            home_route: normalize(home_route),
            public_routes,
        }
    }

    pub fn with_public_route(mut self, route: &str) -> Self {
        self.public_routes.insert(normalize(route));
        self
    }

    pub fn login_route(&self) -> &str {
        &self.login_route
    }

    pub fn home_route(&self) -> &str {
        &self.home_route
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public_routes.contains(&normalize(path))
    }

    pub fn decide(&self, path: &str, auth: &AuthSnapshot) -> GuardDecision {
        let path = normalize(path);

        if path == self.login_route {
            if auth.is_authenticated && !auth.is_loading {
                return GuardDecision::Redirect(self.home_route.clone());
            }
            return GuardDecision::Render;
        }

        if self.public_routes.contains(&path) {
            return GuardDecision::Render;
        }

        if auth.is_loading {
            GuardDecision::Loading
        } else if !auth.is_authenticated {
            GuardDecision::Redirect(self.login_route.clone())
        } else {
            GuardDecision::Render
        }
    }
}

/// Strip query, fragment and trailing slashes; "" and "/" both become "/".
fn normalize(path: &str) -> String {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let trimmed = path[..end].trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::session::AuthState;

    fn snapshot(state: AuthState) -> AuthSnapshot {
        let user = state
            .is_authenticated()
            .then(|| User::new("1", "a@x.com"));
        AuthSnapshot::new(state, user, state == AuthState::Ready)
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("/login/"), "/login");
        assert_eq!(normalize("/login?next=%2Fcrew"), "/login");
        assert_eq!(normalize("/crew#top"), "/crew");
        assert_eq!(normalize("crew/roster"), "/crew/roster");
    }

    #[test]
    fn test_unauthenticated_redirects_to_login() {
        let guard = RouteGuard::default();
        let auth = snapshot(AuthState::Unauthenticated);
        assert_eq!(
            guard.decide("/crew", &auth),
            GuardDecision::Redirect("/login".to_string())
        );
        assert_eq!(guard.decide("/login", &auth), GuardDecision::Render);
    }

    #[test]
    fn test_loading_withholds_private_routes() {
        let guard = RouteGuard::default();
        for state in [AuthState::Authenticating, AuthState::RolesPending] {
            let auth = snapshot(state);
            assert_eq!(guard.decide("/crew", &auth), GuardDecision::Loading);
            assert_eq!(guard.decide("/login", &auth), GuardDecision::Render);
            assert_eq!(guard.decide("/reset-password", &auth), GuardDecision::Render);
        }
    }

    #[test]
    fn test_ready_leaves_login() {
        let guard = RouteGuard::default();
        let auth = snapshot(AuthState::Ready);
        assert_eq!(
            guard.decide("/login/?next=x", &auth),
            GuardDecision::Redirect("/".to_string())
        );
        assert_eq!(guard.decide("/crew", &auth), GuardDecision::Render);
        assert_eq!(guard.decide("/reset-password", &auth), GuardDecision::Render);
    }

    #[test]
    fn test_expired_redirects_to_login() {
        let guard = RouteGuard::default();
        let auth = snapshot(AuthState::Expired);
        assert_eq!(
            guard.decide("/crew", &auth),
            GuardDecision::Redirect("/login".to_string())
        );
    }

    #[test]
    fn test_custom_routes() {
        let guard = RouteGuard::new("/signin/", "/dashboard").with_public_route("/about");
        assert!(guard.is_public("/signin"));
        assert!(guard.is_public("/about?x=1"));
        assert!(!guard.is_public("/login"));

        let auth = snapshot(AuthState::Unauthenticated);
        assert_eq!(guard.decide("/about", &auth), GuardDecision::Render);
        assert_eq!(
            guard.decide("/crew", &auth),
            GuardDecision::Redirect("/signin".to_string())
        );
        assert_eq!(
            guard.decide("/signin", &snapshot(AuthState::Ready)),
            GuardDecision::Redirect("/dashboard".to_string())
        );
    }
}
