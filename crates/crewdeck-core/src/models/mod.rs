//! Data models shared across the session subsystem.
//!
//! - `User`, `RoleSet`: identity record and its authorization roles
//! - `Session`: the bearer/refresh token pair with an expiry hint

pub mod session;
pub mod user;

pub use session::Session;
pub use user::{RoleSet, User};
