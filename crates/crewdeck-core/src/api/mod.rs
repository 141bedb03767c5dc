//! Auth API client module.
//!
//! This module provides the `AuthClient` contract over the backend's four
//! authentication endpoints (login, verify, refresh, user roles) and the
//! reqwest-backed `HttpAuthClient`.
//!
//! Every call returns a classified `AuthError` on failure instead of an
//! opaque transport error.

pub mod client;
pub mod error;

pub use client::{AuthClient, HttpAuthClient};
pub use error::{AuthError, Endpoint};
