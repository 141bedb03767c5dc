//! Crewdeck core library.
//!
//! Client-side session lifecycle for the crewdeck back office: signing in,
//! keeping the token pair fresh, loading roles, persisting the session
//! between runs and closing it after a period of inactivity.
//!
//! Front ends build one [`SessionManager`] at startup and read it through
//! [`AuthSnapshot`] values and [`SessionEvent`] notifications. [`RouteGuard`]
//! turns a snapshot into a render/redirect decision for a route.

pub mod api;
pub mod config;
pub mod guard;
pub mod inactivity;
pub mod models;
pub mod session;
pub mod store;

pub use api::{AuthClient, AuthError, HttpAuthClient};
pub use config::{Config, StorageBackend};
pub use guard::{GuardDecision, RouteGuard};
pub use inactivity::{
    ActivityHub, ActivityKind, ActivitySource, InactivityConfig, InactivityMonitor, Scheduler,
    TokioScheduler,
};
pub use models::{RoleSet, Session, User};
pub use session::{AuthSnapshot, AuthState, LogoutReason, SessionEvent, SessionManager};
pub use store::{FileSessionStore, KeyringSessionStore, MemorySessionStore, SessionStore};
