use std::fmt;
use std::time::Duration;

use crate::api::AuthError;
use crate::models::User;

/// Where the session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    /// Login or startup verification in flight.
    Authenticating,
    /// Tokens and identity known, roles not fetched yet.
    RolesPending,
    Ready,
    /// Credentials rejected or abandoned; cleared immediately after.
    Expired,
}

impl AuthState {
    pub fn is_loading(&self) -> bool {
        matches!(self, AuthState::Authenticating | AuthState::RolesPending)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, AuthState::RolesPending | AuthState::Ready)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::Authenticating => "authenticating",
            AuthState::RolesPending => "authenticated (roles pending)",
            AuthState::Ready => "authenticated",
            AuthState::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Read-only view of the session handed to consumers.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSnapshot {
    pub state: AuthState,
    pub user: Option<User>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub is_roles_loaded: bool,
}

impl AuthSnapshot {
    pub fn new(state: AuthState, user: Option<User>, is_roles_loaded: bool) -> Self {
        Self {
            state,
            user,
            is_authenticated: state.is_authenticated(),
            is_loading: state.is_loading(),
            is_roles_loaded,
        }
    }

    pub fn unauthenticated() -> Self {
        Self::new(AuthState::Unauthenticated, None, false)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.is_roles_loaded && self.user.as_ref().is_some_and(|u| u.has_role(role))
    }
}

impl Default for AuthSnapshot {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    InactivityTimeout,
    RefreshFailed,
    /// Verify, refresh or a stored token was rejected by the backend.
    TokenRejected,
    /// The session could not be written to the store.
    StorageUnavailable,
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LogoutReason::UserRequested => "signed out",
            LogoutReason::InactivityTimeout => "signed out after a period of inactivity",
            LogoutReason::RefreshFailed => "session could not be renewed",
            LogoutReason::TokenRejected => "session is no longer valid",
            LogoutReason::StorageUnavailable => "session could not be saved",
        };
        f.write_str(text)
    }
}

/// Notifications for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(AuthState),
    /// The session will be closed for inactivity after `remaining`.
    InactivityWarning { remaining: Duration },
    /// Roles could not be loaded; the session stays in `RolesPending`.
    RolesUnavailable(AuthError),
    SignedOut(LogoutReason),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loading_states() {
        assert!(AuthState::Authenticating.is_loading());
        assert!(AuthState::RolesPending.is_loading());
        assert!(!AuthState::Ready.is_loading());
        assert!(!AuthState::Unauthenticated.is_loading());
        assert!(!AuthState::Expired.is_loading());
    }

    #[test]
    fn test_authenticated_states() {
        assert!(AuthState::RolesPending.is_authenticated());
        assert!(AuthState::Ready.is_authenticated());
        assert!(!AuthState::Authenticating.is_authenticated());
        assert!(!AuthState::Expired.is_authenticated());
    }

    #[test]
    fn test_snapshot_roles_gate() {
        let mut user = User::new("1", "a@x.com");
        user.roles.insert("admin");

        let pending = AuthSnapshot::new(AuthState::RolesPending, Some(user.clone()), false);
        assert!(pending.is_authenticated);
        assert!(pending.is_loading);
        assert!(!pending.has_role("admin"));

        let ready = AuthSnapshot::new(AuthState::Ready, Some(user), true);
        assert!(!ready.is_loading);
        assert!(ready.has_role("admin"));
    }
}
