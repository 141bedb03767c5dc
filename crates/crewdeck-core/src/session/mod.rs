//! Session state machine.
//!
//! `SessionManager` drives the lifecycle
//! `Unauthenticated -> Authenticating -> RolesPending -> Ready`, and back to
//! `Unauthenticated` through `Expired` on logout, refresh or verify failure,
//! or inactivity timeout. Consumers read it through `AuthSnapshot` and
//! `SessionEvent`.

pub mod manager;
pub mod state;

pub use manager::SessionManager;
pub use state::{AuthSnapshot, AuthState, LogoutReason, SessionEvent};
