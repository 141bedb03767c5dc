//! Durable storage for the current session.
//!
//! The tokens and the cached user are always written, read and removed as one
//! record, so a reader never observes tokens without a user or the reverse.
//!
//! - `FileSessionStore`: JSON file in the cache directory
//! - `KeyringSessionStore`: single OS keychain entry
//! - `MemorySessionStore`: process-local, for tests and throwaway shells

pub mod file;
pub mod keychain;
pub mod memory;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Session, User};

pub use self::file::FileSessionStore;
pub use self::keychain::KeyringSessionStore;
pub use self::memory::MemorySessionStore;

/// Persistence for the session/user pair.
///
/// Only the session manager writes through this trait.
pub trait SessionStore: Send + Sync {
    /// Persist both halves, replacing whatever was stored before.
    fn save(&self, session: &Session, user: &User) -> Result<()>;

    /// Load the stored pair. Partial or unreadable records come back as `None`.
    fn load(&self) -> Result<Option<(Session, User)>>;

    /// Remove both halves. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

/// On-disk layout shared by the persistent backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
    #[serde(default = "Utc::now")]
    pub issued_at: DateTime<Utc>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl StoredSession {
    pub fn new(session: &Session, user: &User) -> Self {
        Self {
            access_token: session.access_token.clone(),
            refresh_token: session.refresh_token.clone(),
            user: user.clone(),
            issued_at: session.issued_at,
            expires_in: session.expires_in,
        }
    }

    /// Empty tokens count as a partial record.
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.refresh_token.is_empty()
    }

    pub fn into_parts(self) -> (Session, User) {
        let session = Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            issued_at: self.issued_at,
            expires_in: self.expires_in,
        };
        (session, self.user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_session_requires_all_keys() {
        let missing_user = r#"{"access_token": "a", "refresh_token": "r"}"#;
        assert!(serde_json::from_str::<StoredSession>(missing_user).is_err());

        let missing_refresh = r#"{"access_token": "a", "user": {"id": "1", "email": "a@x.com"}}"#;
        assert!(serde_json::from_str::<StoredSession>(missing_refresh).is_err());
    }

    #[test]
    fn test_stored_session_blank_token_is_partial() {
        let json = r#"{"access_token": "", "refresh_token": "r", "user": {"id": "1", "email": "a@x.com"}}"#;
        let stored: StoredSession = serde_json::from_str(json).expect("record parses");
        assert!(!stored.is_complete());
    }
}
